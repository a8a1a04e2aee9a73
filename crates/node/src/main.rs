//! keel storage node.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::process::ExitCode;

use clap::Parser;
use keel_node::Error;
use keel_node::cli::{Args, init_tracing, write_completion};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(shell) = args.completion {
        write_completion(shell, &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }

    let result = match init_tracing(args.debug, args.log_filter.as_deref()) {
        Ok(()) => keel_node::run_args(args).await,
        Err(e) => Err(Error::from(e)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

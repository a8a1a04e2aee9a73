//! Command line surface of `keeld`.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use keel_server::{Config, DEFAULT_DATA_DIR};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::NodeOptions;

const SI_UNITS: [(&str, u64); 6] = [
    ("k", 1000),
    ("m", 1000u64.pow(2)),
    ("g", 1000u64.pow(3)),
    ("t", 1000u64.pow(4)),
    ("p", 1000u64.pow(5)),
    ("e", 1000u64.pow(6)),
];

/// Errors resolving the node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Size string could not be parsed.
    #[error("invalid size {0:?}")]
    InvalidSize(String),

    /// Percentage outside `1..=100`.
    #[error("invalid percentage {0:?}: must be between 1% and 100%")]
    InvalidPercent(String),

    /// Filesystem size could not be determined for a percentage size.
    #[error("couldn't determine size of filesystem holding {0}: {1}")]
    FilesystemSize(PathBuf, #[source] std::io::Error),

    /// Log filter directives are invalid.
    #[error("invalid log filter: {0}")]
    LogFilter(String),
}

/// Command line arguments of `keeld`.
#[derive(Clone, Debug, Parser)]
#[command(name = "keeld", version, about = "keel storage node", long_about = None)]
pub struct Args {
    /// Directory holding the node identity and file-backed blocks
    #[arg(long, default_value = DEFAULT_DATA_DIR, env = "KEEL_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Raw block device to store blocks on instead of a file
    #[arg(long, env = "KEEL_BLOCK_DEVICE")]
    pub block_device: Option<PathBuf>,

    /// Storage to contribute: a size such as 512MiB or 20GB, or a percentage
    /// of the data directory's filesystem such as 50%
    #[arg(long, default_value = "1GiB", env = "KEEL_SIZE")]
    pub size: String,

    /// Address of the cluster metadata service; standalone when unset
    #[arg(long, env = "KEEL_METADATA_ADDRESS")]
    pub metadata_address: Option<String>,

    /// Address to accept replication traffic on
    #[arg(long, env = "KEEL_PEER_ADDRESS")]
    pub peer_address: Option<String>,

    /// Address to serve Prometheus metrics on, such as :4321 or
    /// localhost:9100
    #[arg(long = "http", env = "KEEL_HTTP")]
    pub metrics_address: Option<String>,

    /// Create the cluster's global metadata before starting
    #[arg(long, visible_alias = "debug-init")]
    pub init_cluster: bool,

    /// Add this node to the ring on startup
    #[arg(long)]
    pub auto_join: bool,

    /// Turn on debug output
    #[arg(long)]
    pub debug: bool,

    /// Per-module log directives, such as keel_replication=trace
    #[arg(long, env = "KEEL_LOG_FILTER")]
    pub log_filter: Option<String>,

    /// Print shell completion code and exit
    #[arg(long, value_name = "SHELL")]
    pub completion: Option<Shell>,
}

impl Args {
    /// Resolve the arguments into node options.
    ///
    /// # Errors
    ///
    /// Fails if the size cannot be resolved.
    pub fn into_options(self) -> Result<NodeOptions, ConfigError> {
        let storage_size = resolve_size(&self.size, &self.data_dir)?;

        Ok(NodeOptions {
            config: Config {
                data_dir: self.data_dir,
                block_device: self.block_device,
                storage_size,
                metadata_address: self.metadata_address.filter(|a| !a.trim().is_empty()),
                peer_address: self.peer_address.filter(|a| !a.trim().is_empty()),
            },
            init_cluster: self.init_cluster,
            autojoin: self.auto_join,
            metrics_address: self.metrics_address.filter(|a| !a.trim().is_empty()),
        })
    }
}

/// Write completion code for `shell` to `out`.
pub fn write_completion(shell: Shell, out: &mut dyn Write) {
    let mut command = Args::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, out);
}

/// Parse a human readable size into bytes.
///
/// Accepts a number, optionally fractional, followed by an optional unit.
/// SI units (`kB`, `MB`, `GB`, ...) are powers of 1000 and IEC units (`KiB`,
/// `MiB`, `GiB`, ...) powers of 1024. Units are case-insensitive and may be
/// separated from the number by spaces.
///
/// # Errors
///
/// Fails on malformed input, unknown units and sizes that overflow `u64`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidSize(input.to_string());

    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    if number.is_empty() {
        return Err(invalid());
    }

    let multiplier = unit_multiplier(&unit.trim().to_ascii_lowercase()).ok_or_else(invalid)?;

    if number.contains('.') {
        let value: f64 = number.parse().map_err(|_| invalid())?;
        let bytes = (value * multiplier as f64).floor();
        if !bytes.is_finite() || bytes >= u64::MAX as f64 {
            return Err(invalid());
        }
        Ok(bytes as u64)
    } else {
        let value: u64 = number.parse().map_err(|_| invalid())?;
        value.checked_mul(multiplier).ok_or_else(invalid)
    }
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    if unit.is_empty() || unit == "b" {
        return Some(1);
    }

    let unit = unit.strip_suffix('b').unwrap_or(unit);
    let (prefix, binary) = match unit.strip_suffix('i') {
        Some(prefix) => (prefix, true),
        None => (unit, false),
    };

    SI_UNITS
        .iter()
        .position(|(name, _)| *name == prefix)
        .map(|i| {
            if binary {
                1024u64.pow(u32::try_from(i + 1).unwrap_or(u32::MAX))
            } else {
                SI_UNITS[i].1
            }
        })
}

/// Resolve a size argument against the filesystem holding `data_dir`.
///
/// `N%` with `1 <= N <= 100` is that share of the filesystem's total space;
/// anything else goes through [`parse_size`].
///
/// # Errors
///
/// Fails on invalid sizes or percentages, or if the filesystem cannot be
/// inspected.
pub fn resolve_size(input: &str, data_dir: &Path) -> Result<u64, ConfigError> {
    let Some(percent) = input.trim().strip_suffix('%') else {
        return parse_size(input);
    };

    let percent: u64 = percent
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPercent(input.to_string()))?;
    if !(1..=100).contains(&percent) {
        return Err(ConfigError::InvalidPercent(input.to_string()));
    }

    let existing = existing_ancestor(data_dir);
    let total = fs3::total_space(&existing)
        .map_err(|e| ConfigError::FilesystemSize(existing.clone(), e))?;

    Ok(u64::try_from(u128::from(total) * u128::from(percent) / 100).unwrap_or(u64::MAX))
}

// The data directory may not exist before first start.
fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Install the global tracing subscriber.
///
/// The default level is info, or debug with `debug` set. Extra `filter`
/// directives lower the default to warn so that only the named modules are
/// verbose.
///
/// # Errors
///
/// Fails if the filter directives are invalid.
pub fn init_tracing(debug: bool, filter: Option<&str>) -> Result<(), ConfigError> {
    let filter = log_filter(debug, filter)?;
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("could not set global default subscriber: {e}");
    }
    Ok(())
}

fn log_filter(debug: bool, filter: Option<&str>) -> Result<EnvFilter, ConfigError> {
    let directives = match filter.map(str::trim).filter(|f| !f.is_empty()) {
        Some(filter) => format!("warn,{filter}"),
        None if debug => "debug".to_string(),
        None => "info".to_string(),
    };
    EnvFilter::try_new(&directives).map_err(|e| ConfigError::LogFilter(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1GiB").unwrap(), 1_073_741_824);
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("4KB").unwrap(), 4000);
        assert_eq!(parse_size("4 kib").unwrap(), 4096);
        assert_eq!(parse_size("20G").unwrap(), 20_000_000_000);
        assert_eq!(parse_size("1.5 TiB").unwrap(), 1_649_267_441_664);
        assert_eq!(parse_size("0.5MB").unwrap(), 500_000);
        assert_eq!(parse_size(" 3 mib ").unwrap(), 3 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_rejects() {
        for input in ["", "GiB", "1.2.3", "12 parsecs", "-1", "100000EiB"] {
            assert!(
                matches!(parse_size(input), Err(ConfigError::InvalidSize(_))),
                "{input:?} should not parse"
            );
        }
    }

    #[test]
    fn test_resolve_percent() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("not-created-yet");

        let total = fs3::total_space(dir.path()).unwrap();
        assert_eq!(resolve_size("100%", &data_dir).unwrap(), total);
        assert_eq!(resolve_size("50%", &data_dir).unwrap(), total / 2);
        assert_eq!(resolve_size("1GiB", &data_dir).unwrap(), 1_073_741_824);

        for input in ["0%", "101%", "half%"] {
            assert!(matches!(
                resolve_size(input, &data_dir),
                Err(ConfigError::InvalidPercent(_))
            ));
        }
    }

    #[test]
    fn test_args_into_options() {
        let args = Args::parse_from([
            "keeld",
            "--data-dir",
            "/var/lib/keel",
            "--size",
            "2GiB",
            "--metadata-address",
            "10.0.0.5:4321",
            "--peer-address",
            "",
            "--http",
            "127.0.0.1:9100",
            "--debug-init",
            "--auto-join",
        ]);
        let options = args.into_options().unwrap();

        assert_eq!(options.config.data_dir, PathBuf::from("/var/lib/keel"));
        assert_eq!(options.config.storage_size, 2 * 1_073_741_824);
        assert_eq!(
            options.config.metadata_address.as_deref(),
            Some("10.0.0.5:4321")
        );
        assert_eq!(options.config.peer_address, None);
        assert_eq!(options.metrics_address.as_deref(), Some("127.0.0.1:9100"));
        assert_eq!(args_completion(&["keeld"]), None);
        assert!(options.init_cluster);
        assert!(options.autojoin);
    }

    fn args_completion(argv: &[&str]) -> Option<Shell> {
        Args::parse_from(argv).completion
    }

    #[test]
    fn test_http_accepts_port_only_and_host_names() {
        let options = Args::parse_from(["keeld", "--http", ":4321"])
            .into_options()
            .unwrap();
        assert_eq!(options.metrics_address.as_deref(), Some(":4321"));

        let options = Args::parse_from(["keeld", "--http", "localhost:9100"])
            .into_options()
            .unwrap();
        assert_eq!(options.metrics_address.as_deref(), Some("localhost:9100"));

        let options = Args::parse_from(["keeld", "--http", ""]).into_options().unwrap();
        assert_eq!(options.metrics_address, None);
    }

    #[test]
    fn test_completion() {
        assert_eq!(
            args_completion(&["keeld", "--completion", "bash"]),
            Some(Shell::Bash)
        );
        assert!(Args::try_parse_from(["keeld", "--completion", "tcsh"]).is_err());

        let mut out = Vec::new();
        write_completion(Shell::Bash, &mut out);
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("keeld"));
        assert!(script.contains("--auto-join"));
        assert!(script.contains("--metadata-address"));
    }

    #[test]
    fn test_log_filter() {
        assert!(log_filter(false, None).is_ok());
        assert!(log_filter(true, None).is_ok());
        assert!(log_filter(false, Some("keel_replication=trace")).is_ok());
        assert!(matches!(
            log_filter(false, Some("keel=notalevel")),
            Err(ConfigError::LogFilter(_))
        ));
    }
}

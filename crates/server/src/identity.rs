use std::io;
use std::path::Path;

use keel_ring::NodeId;
use tokio::fs;
use tracing::info;

use crate::ServerError;

/// File inside the data directory holding the node identifier.
pub const NODE_ID_FILE_NAME: &str = "node-id";

/// Load the node identifier stored in `data_dir`, creating one on first start.
///
/// Keeping the identifier stable across restarts is what lets a restarted
/// node recognize itself as an existing ring member.
///
/// # Errors
///
/// Fails if the data directory cannot be written or the stored identifier
/// is corrupt.
pub async fn load_or_create_node_id(data_dir: &Path) -> Result<NodeId, ServerError> {
    let path = data_dir.join(NODE_ID_FILE_NAME);

    match fs::read_to_string(&path).await {
        Ok(contents) => return Ok(contents.parse()?),
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(ServerError::Io("error reading node id", e)),
    }

    fs::create_dir_all(data_dir)
        .await
        .map_err(|e| ServerError::Io("error creating data directory", e))?;

    let node_id = NodeId::generate();
    fs::write(&path, format!("{node_id}\n"))
        .await
        .map_err(|e| ServerError::Io("error writing node id", e))?;
    info!("generated node id {node_id} in {}", path.display());

    Ok(node_id)
}

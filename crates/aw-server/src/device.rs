//! Device identity management.
//!
//! Each data directory gets a persistent UUID stored in `device.json`. It is
//! reported by `get_info` so clients can tell stores apart when syncing.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEVICE_FILE: &str = "device.json";

/// Device identity stored in `device.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Persistent UUID for this store.
    pub device_id: String,
}

/// Loads the identity from `data_dir`, creating it on first use.
pub fn load_or_init(data_dir: &Path) -> Result<DeviceIdentity> {
    let path = data_dir.join(DEVICE_FILE);
    if let Some(identity) = load_from(&path)? {
        return Ok(identity);
    }

    let identity = DeviceIdentity {
        device_id: Uuid::new_v4().to_string(),
    };
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let json = serde_json::to_string_pretty(&identity).context("failed to serialize identity")?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(device_id = %identity.device_id, "created device identity");
    Ok(identity)
}

/// Loads the identity from a specific path.
///
/// Returns `None` if the file doesn't exist.
fn load_from(path: &Path) -> Result<Option<DeviceIdentity>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let identity: DeviceIdentity = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            Ok(Some(identity))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

//! Data directory layout for Conductor.
//!
//! Everything the CLI persists lives under one directory: `config.toml`
//! and the `conductor.db` execution store.

use std::path::{Path, PathBuf};

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CONDUCTOR_DATA_DIR` environment variable
/// 2. `~/.conductor` under the user's home directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CONDUCTOR_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".conductor");
    }

    // Last resort: current directory
    PathBuf::from(".conductor")
}

/// Create the data directory (and parents) if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}

//! Centralized directory structure for CourseChat storage
//!
//! Directory layout:
//! ```text
//! coursechat/
//! └── local/           # SQLite database (users, sessions, messages)
//! ```

use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable that overrides the storage root.
pub const ROOT_ENV: &str = "COURSECHAT_ROOT";

/// Get the storage root from environment, platform data dir, or default
pub fn data_root() -> PathBuf {
    if let Ok(val) = std::env::var(ROOT_ENV) {
        return PathBuf::from(val);
    }

    if let Some(dir) = dirs::data_local_dir() {
        return dir.join("coursechat");
    }

    PathBuf::from("coursechat_data")
}

/// Local data directory (SQLite) under the given root
pub fn local_dir(root: &Path) -> PathBuf {
    root.join("local")
}

/// Database file path under the given root
pub fn db_path(root: &Path) -> PathBuf {
    local_dir(root).join("coursechat.sqlite")
}

/// Ensure a single directory exists
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

mod config;
pub mod database;
mod memory;
pub mod migrations;

pub use config::{Config, NotificationsConfig};
pub use database::SqliteStore;
pub use memory::MemoryStore;

use std::path::PathBuf;

/// Returns the data directory, creating it if needed.
///
/// `FOCUSROOM_DATA_DIR` wins when set. Otherwise `~/.config/focusroom[-dev]/`,
/// with `FOCUSROOM_ENV=dev` selecting the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("FOCUSROOM_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOCUSROOM_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusroom-dev")
            } else {
                base_dir.join("focusroom")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

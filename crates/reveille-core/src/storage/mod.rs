mod config;
pub mod database;
mod store;

pub use config::{
    AudioConfig, ChallengeConfig, Config, DisplayConfig, NotificationsConfig, TickConfig,
};
pub use database::Database;
pub use store::{AlarmStore, MemoryStore, ALARMS_KEY};

use std::path::PathBuf;

/// Returns `~/.config/reveille[-dev]/` based on REVEILLE_ENV.
///
/// Set REVEILLE_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("REVEILLE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("reveille-dev")
    } else {
        base_dir.join("reveille")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

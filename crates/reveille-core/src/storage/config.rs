//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Clock display format (12/24h, date order)
//! - Tick source isolation and period
//! - Challenge retry policy
//! - Notification and audio toggles
//!
//! Configuration is stored at `~/.config/reveille/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;

/// Clock display preferences shared with the view layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Render times as 24h. The engine itself always works in 24h `HH:MM`.
    #[serde(default)]
    pub clock24: bool,
    /// "US" (MM/DD/YYYY) or "UK" (DD/MM/YYYY).
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    /// Run the tick source on a dedicated thread. `false` forces the
    /// in-runtime fallback.
    #[serde(default = "default_true")]
    pub isolated: bool,
    #[serde(default = "default_tick_period_ms")]
    pub period_ms: u64,
}

/// Strict-alarm challenge policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChallengeConfig {
    /// Issue a fresh problem after every wrong answer.
    #[serde(default)]
    pub regenerate_on_failure: bool,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Audio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// `false` keeps the output muted; alarms still ring silently.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/reveille/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub tick: TickConfig,
    #[serde(default)]
    pub challenge: ChallengeConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

// Default functions
fn default_date_format() -> String {
    "US".into()
}
fn default_true() -> bool {
    true
}
fn default_tick_period_ms() -> u64 {
    1000
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            clock24: false,
            date_format: default_date_format(),
        }
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            isolated: true,
            period_ms: default_tick_period_ms(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl TickConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("~/.config/reveille"),
                message: e.to_string(),
            })
    }

    /// Load from disk, writing defaults on first run.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key, type-checked against the current
    /// value. Does not persist; call [`Config::save`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert!(!parsed.display.clock24);
        assert!(parsed.tick.isolated);
        assert!(parsed.audio.enabled);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[display]\nclock24 = true\n").unwrap();
        assert!(parsed.display.clock24);
        assert_eq!(parsed.display.date_format, "US");
        assert_eq!(parsed.tick.period_ms, 1000);
        assert!(!parsed.challenge.regenerate_on_failure);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("display.clock24").as_deref(), Some("false"));
        assert_eq!(cfg.get("tick.period_ms").as_deref(), Some("1000"));
        assert_eq!(cfg.get("display.date_format").as_deref(), Some("US"));
        assert!(cfg.get("display.missing_key").is_none());
    }

    #[test]
    fn set_updates_typed_values() {
        let mut cfg = Config::default();
        cfg.set("display.clock24", "true").unwrap();
        cfg.set("challenge.regenerate_on_failure", "true").unwrap();
        cfg.set("tick.period_ms", "250").unwrap();
        cfg.set("display.date_format", "UK").unwrap();
        assert!(cfg.display.clock24);
        assert!(cfg.challenge.regenerate_on_failure);
        assert_eq!(cfg.tick.period(), Duration::from_millis(250));
        assert_eq!(cfg.display.date_format, "UK");
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("display.nonexistent", "x"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("display.clock24", "yes please"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("tick.period_ms", "-5"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(!cfg.display.clock24);
    }

    #[test]
    fn load_from_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert!(cfg.notifications.enabled);

        let mut changed = cfg.clone();
        changed.set("notifications.enabled", "false").unwrap();
        changed.save_to(&path).unwrap();
        assert!(!Config::load_from(&path).unwrap().notifications.enabled);
    }

    #[test]
    fn unreadable_config_is_an_error_not_a_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::create_dir(&path).unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
        assert!(path.is_dir());

        let garbled = dir.path().join("garbled.toml");
        std::fs::write(&garbled, [0xff, 0xfe, 0x00]).unwrap();
        assert!(Config::load_from(&garbled).is_err());
        assert_eq!(std::fs::read(&garbled).unwrap(), [0xff, 0xfe, 0x00]);
    }
}

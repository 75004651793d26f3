//! TOML-based engine configuration.
//!
//! Holds the tunables every engine entry point receives explicitly:
//! - Materialization horizon and fallback start/duration
//! - Grace period before a planned occurrence turns `missed`
//! - Placement bounds and scan step for the Nearest policy
//!
//! Configuration is stored at `~/.config/cadence/config.toml`.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, CoreError, Result};
use crate::time::ClockTime;

/// Placement tunables for the conflict resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementConfig {
    /// Scan increment for the Nearest policy, in minutes.
    #[serde(default = "default_step_minutes")]
    pub step_minutes: u32,
    /// Earliest start the Nearest policy may move to.
    #[serde(default = "default_day_start")]
    pub day_start: ClockTime,
    /// Exclusive upper bound for starts chosen by the Nearest policy.
    #[serde(default = "default_day_end")]
    pub day_end: ClockTime,
    /// Optional grid of candidate starts; when non-empty, Nearest only
    /// picks from it.
    #[serde(default)]
    pub candidate_slots: Vec<ClockTime>,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/cadence/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Rolling materialization horizon in days.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Start used when nothing else resolves a slot.
    #[serde(default = "default_start")]
    pub default_start: ClockTime,
    /// Duration used when neither slot nor action gives one.
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: u32,
    /// Minutes past an occurrence's end before it is marked `missed`.
    #[serde(default)]
    pub missed_grace_minutes: u32,
    #[serde(default)]
    pub placement: PlacementConfig,
}

// Default functions
fn default_window_days() -> u32 {
    14
}
fn default_start() -> ClockTime {
    ClockTime::hm(9, 0)
}
fn default_duration_minutes() -> u32 {
    30
}
fn default_step_minutes() -> u32 {
    15
}
fn default_day_start() -> ClockTime {
    ClockTime::hm(5, 0)
}
fn default_day_end() -> ClockTime {
    ClockTime::hm(22, 0)
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            step_minutes: default_step_minutes(),
            day_start: default_day_start(),
            day_end: default_day_end(),
            candidate_slots: Vec::new(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            default_start: default_start(),
            default_duration_minutes: default_duration_minutes(),
            missed_grace_minutes: 0,
            placement: PlacementConfig::default(),
        }
    }
}

/// Returns `~/.config/cadence[-dev]/` based on CADENCE_ENV.
///
/// Set CADENCE_ENV=dev to use the development config directory.
///
/// # Errors
/// Returns an error if the home directory is unknown or creating the
/// config directory fails.
pub fn config_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir().ok_or(ConfigError::NoConfigDir)?.join(".config");

    let env = std::env::var("CADENCE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("cadence-dev")
    } else {
        base_dir.join("cadence")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

impl EngineConfig {
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

    fn set_json_value_by_path(root: &mut serde_json::Value, key: &str, value: &str) -> Result<()> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown().into());
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

        Err(unknown().into())
    }

    pub fn path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            Ok(cfg)
        }
    }

    /// Load and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: EngineConfig = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Reject configurations no placement could honour.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "window_days".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.placement.step_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "placement.step_minutes".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.placement.day_start >= self.placement.day_end {
            return Err(ConfigError::InvalidValue {
                key: "placement.day_end".into(),
                message: format!(
                    "{} must be after day_start {}",
                    self.placement.day_end, self.placement.day_start
                ),
            });
        }
        Ok(())
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

    /// Set a value by dot-separated key; the result must still validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// into the field's type. `self` is left untouched on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: EngineConfig = serde_json::from_value(json).map_err(|e| {
            CoreError::from(ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Grace period before a planned occurrence is marked `missed`.
    pub fn missed_grace(&self) -> Duration {
        Duration::minutes(self.missed_grace_minutes as i64)
    }
}

//! Save-file configuration
//!
//! Stored as JSON. A missing or malformed file falls back to defaults so a bad
//! config never prevents a cartridge from loading.

use gbcart_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the home directory used when no save root is configured.
pub const APP_SUPPORT_DIR: &str = ".gbcart";
/// Subdirectory holding `<rom stem>.bat` files.
pub const BATTERY_DIR: &str = "Battery";
pub const BATTERY_EXTENSION: &str = "bat";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Root for save data; `{home}/.gbcart` when unset
    #[serde(default)]
    pub save_root: Option<PathBuf>,
    /// `sync_data` after every battery write instead of a plain flush
    #[serde(default)]
    pub durable_writes: bool,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_save_root(home: Option<PathBuf>) -> PathBuf {
    let home = home.unwrap_or_else(|| {
        log(LogCategory::Battery, LogLevel::Warn, || {
            "No HOME or USERPROFILE set; saving under the working directory".to_string()
        });
        PathBuf::from(".")
    });
    home.join(APP_SUPPORT_DIR)
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            save_root: None,
            durable_writes: false,
            log_level: default_log_level(),
        }
    }
}

impl SaveConfig {
    /// Load from a JSON file, falling back to defaults on any error.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    log(LogCategory::Battery, LogLevel::Warn, || {
                        format!(
                            "Failed to parse {}: {}. Using defaults.",
                            path.display(),
                            e
                        )
                    });
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Effective save root.
    ///
    /// Unset means `{home}/.gbcart`, with home taken from `HOME` or
    /// `USERPROFILE`. If neither is set, saves go under `./.gbcart` in the
    /// working directory and a warning is logged.
    pub fn save_root(&self) -> PathBuf {
        self.save_root.clone().unwrap_or_else(|| {
            let home = std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(PathBuf::from);
            default_save_root(home)
        })
    }

    /// `{save_root}/Battery/{rom stem}.bat`
    pub fn battery_path(&self, rom_path: &Path) -> PathBuf {
        let mut file_name = rom_path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "cartridge".into());
        file_name.push(".");
        file_name.push(BATTERY_EXTENSION);
        self.save_root().join(BATTERY_DIR).join(file_name)
    }

    /// Default location of the config file itself.
    pub fn default_path() -> PathBuf {
        Self::default().save_root().join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_path_uses_rom_stem() {
        let config = SaveConfig {
            save_root: Some(PathBuf::from("/saves")),
            ..Default::default()
        };
        let path = config.battery_path(Path::new("/roms/Pocket Monsters.gbc"));
        assert_eq!(path, PathBuf::from("/saves/Battery/Pocket Monsters.bat"));
    }

    #[test]
    fn test_battery_path_strips_only_last_extension() {
        let config = SaveConfig {
            save_root: Some(PathBuf::from("/saves")),
            ..Default::default()
        };
        let path = config.battery_path(Path::new("game.v1.1.gb"));
        assert_eq!(path, PathBuf::from("/saves/Battery/game.v1.1.bat"));
    }

    #[test]
    fn test_save_root_without_home_is_working_directory() {
        assert_eq!(default_save_root(None), Path::new(".").join(".gbcart"));
        assert_eq!(
            default_save_root(Some(PathBuf::from("/home/me"))),
            Path::new("/home/me/.gbcart")
        );
    }

    #[test]
    fn test_configured_save_root_is_used_verbatim() {
        let config = SaveConfig {
            save_root: Some(PathBuf::from("/srv/saves")),
            ..Default::default()
        };
        assert_eq!(config.save_root(), Path::new("/srv/saves"));
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: SaveConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SaveConfig::default());
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_save_load() {
        let dir = std::env::temp_dir().join(format!("gbcart_test_config_{}", std::process::id()));
        let path = dir.join("nested").join("config.json");

        let config = SaveConfig {
            save_root: Some(PathBuf::from("/tmp/somewhere")),
            durable_writes: true,
            log_level: LogLevel::Debug,
        };
        config.save(&path).unwrap();
        assert_eq!(SaveConfig::load(&path), config);

        fs::write(&path, "not json").unwrap();
        assert_eq!(SaveConfig::load(&path), SaveConfig::default());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("gbcart_test_config_missing/none.json");
        assert_eq!(SaveConfig::load(&path), SaveConfig::default());
    }
}

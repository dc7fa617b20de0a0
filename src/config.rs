use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LoopyError, Result};
use crate::runner::{DEFAULT_KILL_GRACE, DEFAULT_SHELL};

/// File name of the default store under the per-user config directory
pub const DEFAULT_DB_FILE: &str = "db.sqlite";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub storage: StorageConfig,
    pub runner: RunnerConfig,
    pub editor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub shell: String,
    pub kill_grace_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            kill_grace_ms: DEFAULT_KILL_GRACE.as_millis() as u64,
        }
    }
}

impl RunnerConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            storage: StorageConfig::default(),
            runner: RunnerConfig::default(),
            editor: None,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir
                .join(project_name)
                .join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!(
                            "Failed to load config from {}: {}",
                            primary_config.display(),
                            e
                        );
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| LoopyError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| LoopyError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        log::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Resolve the store location.
    ///
    /// An explicit path (the `--db` flag or `LOOPY_DB`) wins over
    /// `storage.database`, which wins over `<config_dir>/loopy/db.sqlite`.
    pub fn database_path(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = &self.storage.database {
            return Ok(path.clone());
        }
        default_database_path()
    }
}

/// `<config_dir>/loopy/db.sqlite`, with `~/.config` when the platform has no config dir
pub fn default_database_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .ok_or_else(|| {
            LoopyError::Config("Cannot determine a config directory for the store".to_string())
        })?;
    Ok(config_dir.join(env!("CARGO_PKG_NAME")).join(DEFAULT_DB_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.runner.shell, "sh");
        assert_eq!(config.runner.kill_grace(), Duration::from_secs(5));
        assert!(config.storage.database.is_none());
        assert!(config.editor.is_none());
    }

    #[test]
    fn test_load_explicit_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loopy.yml");
        fs::write(&path, "runner:\n  kill_grace_ms: 250\neditor: nano\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.runner.kill_grace(), Duration::from_millis(250));
        assert_eq!(config.runner.shell, "sh");
        assert_eq!(config.editor.as_deref(), Some("nano"));
        assert_eq!(config.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let path = PathBuf::from("/nonexistent/loopy.yml");
        assert!(matches!(Config::load(Some(&path)), Err(LoopyError::Config(_))));
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loopy.yml");
        fs::write(&path, "runner: [unclosed").unwrap();
        assert!(matches!(Config::load(Some(&path)), Err(LoopyError::Config(_))));
    }

    #[test]
    fn test_database_path_precedence() {
        let mut config = Config::default();
        config.storage.database = Some(PathBuf::from("/from/config.sqlite"));

        let explicit = PathBuf::from("/from/flag.sqlite");
        assert_eq!(config.database_path(Some(&explicit)).unwrap(), explicit);
        assert_eq!(
            config.database_path(None).unwrap(),
            PathBuf::from("/from/config.sqlite")
        );

        config.storage.database = None;
        let default = config.database_path(None).unwrap();
        assert!(default.ends_with("loopy/db.sqlite"));
    }
}

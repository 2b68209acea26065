//! restartcoord configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::coordinator::CoordinatorConfig;

const LOCAL_CONFIG: &str = ".restartcoord.yml";

/// Main restartcoord configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Coordinator tuning
    pub coordinator: CoordinatorConfig,

    /// Pending update store file
    #[serde(rename = "store-path")]
    pub store_path: PathBuf,

    /// How to relaunch the application
    pub relaunch: RelaunchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            coordinator: CoordinatorConfig::default(),
            store_path: default_store_path(),
            relaunch: RelaunchConfig::default(),
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("restartcoord")
        .join("pending.json")
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.channel_buffer == 0 {
            return Err(eyre::eyre!("coordinator.channel-buffer must be greater than zero"));
        }
        if let Some(command) = &self.relaunch.command
            && command.trim().is_empty()
        {
            return Err(eyre::eyre!("relaunch.command must not be empty when set"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// An explicit path must load. Otherwise the first readable file from
    /// [`search_paths`] wins, and defaults apply when there is none.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for path in search_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable config"),
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        // A relative store path is relative to the config file naming it
        if config.store_path.is_relative()
            && config.store_path != default_store_path()
            && let Some(dir) = path.parent()
        {
            config.store_path = dir.join(&config.store_path);
        }

        info!(path = %path.display(), store = %config.store_path.display(), "Loaded config");
        Ok(config)
    }
}

/// Config files tried in order when no explicit path is given:
/// `./.restartcoord.yml`, then `{config_dir}/restartcoord/config.yml`
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("restartcoord").join("config.yml"));
    }
    paths
}

/// Relaunch command configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaunchConfig {
    /// Executable to start in place of the current process
    pub command: Option<String>,

    /// Arguments passed to the command
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.log_level.is_none());
        assert_eq!(config.coordinator.channel_buffer, 256);
        assert!(config.store_path.ends_with("restartcoord/pending.json"));
        assert!(config.relaunch.command.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
coordinator:
  channel-buffer: 16
store-path: /var/lib/app/pending.json
relaunch:
  command: /opt/app/bin/app
  args: ["--resume"]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.coordinator.channel_buffer, 16);
        assert_eq!(config.store_path, PathBuf::from("/var/lib/app/pending.json"));
        assert_eq!(config.relaunch.command.as_deref(), Some("/opt/app/bin/app"));
        assert_eq!(config.relaunch.args, vec!["--resume".to_string()]);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("log-level: warn\n").unwrap();
        assert_eq!(config.coordinator, CoordinatorConfig::default());
        assert_eq!(config.relaunch, RelaunchConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let mut config = Config::default();
        config.coordinator.channel_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_command() {
        let mut config = Config::default();
        config.relaunch.command = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rc.yml");
        std::fs::write(&path, "store-path: /tmp/pending.json\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.store_path, PathBuf::from("/tmp/pending.json"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_relative_store_path_follows_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rc.yml");
        std::fs::write(&path, "store-path: state/pending.json\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.store_path, dir.path().join("state").join("pending.json"));
    }

    #[test]
    fn test_search_paths_start_with_local_config() {
        let paths = search_paths();
        assert_eq!(paths[0], PathBuf::from(".restartcoord.yml"));
        assert!(paths.iter().skip(1).all(|p| p.ends_with("restartcoord/config.yml")));
    }
}

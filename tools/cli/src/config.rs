//! CLI configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use offsync_sync::SyncConfig;

const APP_DIR: &str = "offsync";

/// Settings read from `config.json`; every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Where the local replica keeps its stores, queue and cursors.
    pub data_dir: PathBuf,
    /// Directory standing in for the server of record.
    pub remote_dir: PathBuf,
    pub sync: SyncConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        let base = app_dir();
        Self {
            data_dir: base.join("replica"),
            remote_dir: base.join("remote"),
            sync: SyncConfig::default(),
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn default_config_path() -> PathBuf {
    app_dir().join("config.json")
}

impl CliConfig {
    /// Load the config at `path`; a missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read config file {}", path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_sync::SyncMode;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = CliConfig::load(&temp.path().join("none.json")).await.unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        let json = r#"{
            "remote_dir": "/srv/offsync",
            "sync": { "sync_mode": { "mode": "periodic", "interval": { "secs": 30, "nanos": 0 } } }
        }"#;
        tokio::fs::write(&path, json).await.unwrap();

        let config = CliConfig::load(&path).await.unwrap();
        assert_eq!(config.remote_dir, PathBuf::from("/srv/offsync"));
        assert_eq!(config.data_dir, CliConfig::default().data_dir);
        assert!(config.sync.drain_on_enqueue);
        assert_eq!(
            config.sync.sync_mode,
            SyncMode::Periodic {
                interval: Duration::from_secs(30)
            }
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(CliConfig::load(&path).await.is_err());
    }
}

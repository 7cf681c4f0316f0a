use std::path::{Path, PathBuf};
use std::time::Duration;

use cairn_types::HashBand;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Backend used as the multiplex primary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    #[default]
    Memory,
    Filesystem,
}

/// A filesystem backup, optionally sealed with a hex-encoded 32-byte key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub encryption_key: Option<String>,
}

/// Storage configuration, loadable from TOML.
///
/// ```toml
/// primary = "filesystem"
/// path = "/var/lib/cairn"
/// gc_interval_secs = 600
///
/// [[backups]]
/// path = "/mnt/archive/cairn"
/// encryption_key = "00112233..."
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub primary: PluginKind,
    /// Primary filesystem root. Ignored for the memory plugin.
    pub path: PathBuf,
    pub backups: Vec<BackupConfig>,
    pub gc_enabled: bool,
    pub gc_interval_secs: u64,
    pub hash_band: HashBand,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            primary: PluginKind::Memory,
            path: PathBuf::from("cairn-data"),
            backups: Vec::new(),
            gc_enabled: true,
            gc_interval_secs: 3600,
            hash_band: HashBand::DEFAULT,
        }
    }
}

impl StorageConfig {
    /// In-memory primary with no backups.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Filesystem primary rooted at `path`.
    pub fn filesystem(path: impl Into<PathBuf>) -> Self {
        Self {
            primary: PluginKind::Filesystem,
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    fn validate(&self) -> StoreResult<()> {
        if self.hash_band.min > self.hash_band.max {
            return Err(StoreError::Config(format!(
                "hash band {}..={} is empty",
                self.hash_band.min, self.hash_band.max
            )));
        }
        for backup in &self.backups {
            if let Some(key) = &backup.encryption_key {
                cairn_crypto::SymmetricKey::from_hex(key).map_err(|e| {
                    StoreError::Config(format!("backup {}: {e}", backup.path.display()))
                })?;
            }
        }
        Ok(())
    }
}

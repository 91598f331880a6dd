use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default quiet period after the last edit before a save is attempted.
pub const DEFAULT_DEBOUNCE_MS: u64 = 3000;

/// Portal configuration: where data lives and how the auto-save engine is
/// tuned. Stored as TOML in the platform config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Directory for the backing store and the local cache file.
    pub data_dir: PathBuf,
    /// Debounce window for the auto-save engine, in milliseconds.
    pub debounce_ms: u64,
    /// Whether failed/offline saves keep a durable local backup.
    pub offline_backup: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("com", "scorecard-portal", "ScorecardPortal")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./data"));

        Self {
            data_dir,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            offline_backup: true,
        }
    }
}

impl PortalConfig {
    fn config_path() -> PathBuf {
        directories::ProjectDirs::from("com", "scorecard-portal", "ScorecardPortal")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("portal.toml")
    }

    /// Load saved config, falling back to defaults on any failure.
    pub fn load() -> Self {
        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Invalid config at {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("portal.db")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("local_cache.json")
    }

    pub fn debounce(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.debounce_ms as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_roundtrip() {
        let config = PortalConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let loaded: PortalConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let loaded: PortalConfig = toml::from_str("debounce_ms = 500\n").unwrap();
        assert_eq!(loaded.debounce_ms, 500);
        assert!(loaded.offline_backup);
    }
}

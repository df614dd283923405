use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "hub.toml";

/// Node configuration, loaded from `hub.toml` in the node home.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chain_id: String,
    /// Genesis document, relative to `home` unless absolute.
    pub genesis_file: PathBuf,
    pub home: PathBuf,
    /// `tracing-subscriber` filter directive.
    pub log_level: String,
    /// Stop after committing this height. Zero disables.
    pub halt_height: u64,
    /// Local floor on gas price, in the native fee token. Applied by
    /// `check_tx` only.
    pub min_gas_price: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chain_id: "hub-chain".into(),
            genesis_file: PathBuf::from("genesis.json"),
            home: PathBuf::from("."),
            log_level: "info".into(),
            halt_height: 0,
            min_gas_price: 0,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `hub.toml` from `home`, falling back to defaults rooted at
    /// `home` when the file does not exist.
    pub fn load_or_default(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self {
                home: home.to_path_buf(),
                ..Self::default()
            });
        }
        let mut config = Self::load(&path)?;
        config.home = home.to_path_buf();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id.trim().is_empty() {
            return Err(ConfigError::Invalid("chain_id must not be empty".into()));
        }
        Ok(())
    }

    pub fn genesis_path(&self) -> PathBuf {
        if self.genesis_file.is_absolute() {
            self.genesis_file.clone()
        } else {
            self.home.join(&self.genesis_file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = AppConfig::default();
        assert_eq!(c.log_level, "info");
        assert_eq!(c.halt_height, 0);
        assert_eq!(c.genesis_path(), PathBuf::from("./genesis.json"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = AppConfig {
            chain_id: "test-chain".into(),
            halt_height: 10,
            min_gas_price: 5,
            ..AppConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "chain_id = \"other\"\n").unwrap();
        let config = AppConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.chain_id, "other");
        assert_eq!(config.home, dir.path());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn empty_chain_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "chain_id = \"\"\n").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.chain_id, AppConfig::default().chain_id);
        assert_eq!(config.genesis_path(), dir.path().join("genesis.json"));
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::engine::UnknownFeaturePolicy;
use crate::error::{FeatureError, Result};

const APP_NAME: &str = "flagpole";
const CONFIG_FILE: &str = "config.json";

/// Storage driver selection for a named store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory values. `shared` stores use the process-wide map.
    Memory {
        #[serde(default)]
        shared: bool,
    },
    /// SQLite database. Defaults to the platform data directory.
    Database {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagpoleConfig {
    /// Store used when none is named explicitly.
    pub default_store: String,
    pub stores: HashMap<String, StoreConfig>,
    /// Scope kind to authorization handler name.
    pub subscribe: HashMap<String, String>,
    pub unknown_features: UnknownFeaturePolicy,
}

impl Default for FlagpoleConfig {
    fn default() -> Self {
        let mut stores = HashMap::new();
        stores.insert("memory".to_string(), StoreConfig::Memory { shared: false });
        stores.insert("database".to_string(), StoreConfig::Database { path: None });

        Self {
            default_store: "database".to_string(),
            stores,
            subscribe: HashMap::new(),
            unknown_features: UnknownFeaturePolicy::Strict,
        }
    }
}

impl FlagpoleConfig {
    /// Load configuration from the user's config directory.
    /// Returns default config if file doesn't exist or fails to parse.
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn try_load() -> Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// A config with a single private in-memory store.
    pub fn in_memory() -> Self {
        let mut stores = HashMap::new();
        stores.insert("memory".to_string(), StoreConfig::Memory { shared: false });

        Self {
            default_store: "memory".to_string(),
            stores,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.stores.contains_key(&self.default_store) {
            return Err(FeatureError::Config(format!(
                "default store `{}` is not configured",
                self.default_store
            )));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let mut path = config_dir()
        .ok_or_else(|| FeatureError::Config("Could not determine config directory".to_string()))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_store_and_subscription_tables() {
        let config: FlagpoleConfig = serde_json::from_str(
            r#"{
                "default_store": "primary",
                "stores": {
                    "primary": { "driver": "database", "path": "/tmp/flags.db" },
                    "scratch": { "driver": "memory" }
                },
                "subscribe": { "user": "viewFeature" },
                "unknown_features": "inactive"
            }"#,
        )
        .unwrap();

        assert_eq!(config.default_store, "primary");
        assert_eq!(
            config.stores["primary"],
            StoreConfig::Database {
                path: Some(PathBuf::from("/tmp/flags.db"))
            }
        );
        assert_eq!(config.stores["scratch"], StoreConfig::Memory { shared: false });
        assert_eq!(config.subscribe["user"], "viewFeature");
        assert_eq!(config.unknown_features, UnknownFeaturePolicy::Inactive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: FlagpoleConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, FlagpoleConfig::default());
    }

    #[test]
    fn test_unknown_default_store_is_rejected() {
        let config = FlagpoleConfig {
            default_store: "redis".to_string(),
            ..FlagpoleConfig::default()
        };
        assert!(matches!(config.validate(), Err(FeatureError::Config(_))));
    }

    #[test]
    fn test_save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = FlagpoleConfig::in_memory();
        config.save(&path).unwrap();

        assert_eq!(FlagpoleConfig::load_from(&path).unwrap(), config);
    }
}

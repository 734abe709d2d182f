use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use config::{Environment, Source};
use lazy_static::lazy_static;

use super::error::{Error, Result};

static DEFAULT_CONFIG: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/resources/default_config.toml"));

/// A named set of overrides under the `presets` table
#[derive(Debug, Clone, serde::Deserialize)]
struct Preset(HashMap<String, config::Value>);

impl config::Source for Preset {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> std::result::Result<HashMap<String, config::Value>, config::ConfigError> {
        let mut kv = self.0.clone();
        // presets can not pull in other presets
        kv.remove("presets");
        Ok(kv)
    }
}

/// Layered application config: defaults, then environment, then file and preset
pub struct AppConfig(config::Config);

impl AppConfig {
    pub(crate) fn new() -> Self {
        Self(config::Config::new())
    }

    pub fn setup(&mut self) -> Result<&mut Self> {
        self.0
            .merge(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))?;

        // QUEUESIM_SIZE=500 and friends
        self.0.merge(Environment::with_prefix("QUEUESIM"))?;

        Ok(self)
    }

    /// Load config from a file
    pub fn use_file(&mut self, path: &Path) -> Result<&mut Self> {
        self.0.merge(config::File::from(path))?;
        Ok(self)
    }

    /// Apply a preset on top of what is loaded
    pub fn use_preset(&mut self, name: &str) -> Result<&mut Self> {
        let preset: Preset = self.get(format!("presets.{}", name)).map_err(|_| {
            Error::invalid_parameter(
                "preset",
                format!("unknown preset `{}`, available: {}", name, self.presets().join(", ")),
            )
        })?;
        self.0.merge(preset)?;
        Ok(self)
    }

    /// Names of the known presets, sorted
    pub fn presets(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .get::<HashMap<String, config::Value>, _>("presets")
            .map(|p| p.into_iter().map(|(k, _)| k).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Get a single value and deserialize to the given type
    pub fn get<T, K>(&self, key: K) -> Result<T>
    where
        // the value must not borrow from the config, the lock is released
        // before the caller uses it
        T: serde::de::DeserializeOwned,
        K: AsRef<str>,
    {
        Ok(self.0.get(key.as_ref())?)
    }

    /// Deserialize the whole config to the given type
    pub fn fetch<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let t = self.0.clone().try_into()?;
        Ok(t)
    }
}

lazy_static! {
    /// global AppConfig instance
    static ref CONFIG: RwLock<AppConfig> = RwLock::new(AppConfig::new());
}

pub fn setup() -> Result<()> {
    config_mut().setup()?;
    Ok(())
}

/// global AppConfig instance
pub fn config() -> RwLockReadGuard<'static, AppConfig> {
    CONFIG.read().unwrap()
}

/// mutable global AppConfig instance
pub fn config_mut() -> RwLockWriteGuard<'static, AppConfig> {
    CONFIG.write().unwrap()
}

pub mod prelude {
    pub use super::{config, config_mut};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ModelConfig, SimConfig};

    fn test_config() -> AppConfig {
        let mut config = AppConfig::new();
        config.setup().unwrap();
        config
            .use_file(Path::new(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/resources/test_config.toml"
            )))
            .unwrap();

        config
    }

    #[test]
    fn default_config_is_a_sim_config() {
        let mut config = AppConfig::new();
        config.setup().unwrap();

        let cfg: SimConfig = config.fetch().unwrap();
        assert!(cfg.validate().is_ok());
        assert!(matches!(cfg.model, ModelConfig::Single { .. }));
    }

    #[test]
    fn verify_get() {
        let config = test_config();

        let size: usize = config.get("size").unwrap();
        let seed: String = config.get("seed").unwrap();

        assert_eq!(size, 12);
        assert_eq!(seed, "test seed");
    }

    #[test]
    fn preset() {
        let mut config = test_config();

        let cfg: SimConfig = config.fetch().unwrap();
        match cfg.model {
            ModelConfig::Single { stage } => assert_eq!(stage.capacity, None),
            _ => panic!("expected a single stage"),
        }

        config.use_preset("tiny").unwrap();
        let size: usize = config.get("size").unwrap();
        assert_eq!(size, 3);
        let cfg: SimConfig = config.fetch().unwrap();
        match cfg.model {
            ModelConfig::Single { stage } => assert_eq!(stage.capacity, Some(0)),
            _ => panic!("expected a single stage"),
        }

        assert!(config.use_preset("no such preset").is_err());
    }

    #[test]
    fn waterfall_preset() {
        let mut config = AppConfig::new();
        config.setup().unwrap();
        assert!(config.presets().contains(&"waterfall".to_owned()));

        config.use_preset("waterfall").unwrap();
        let cfg: SimConfig = config.fetch().unwrap();
        match cfg.model {
            ModelConfig::Waterfall { first, second } => {
                assert!(first.arrival.is_some());
                assert_eq!(second.servers, 1);
            }
            _ => panic!("expected a waterfall"),
        }
    }
}

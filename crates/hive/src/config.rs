//! Host configuration
//!
//! Loaded from a TOML file, with `HIVE_`-prefixed environment variables layered
//! on top. Nested keys use a double underscore: `HIVE_BUS__CAPACITY=64`.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hive_runtime::{BeeConfig, BusConfig, Chain};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "HIVE_";

/// Errors while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] figment::Error),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Everything the host needs to start
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HiveConfig {
    #[serde(default)]
    pub bus: BusConfig,

    /// Bees to spawn at startup
    #[serde(default)]
    pub bees: Vec<BeeConfig>,

    /// Chains to run against the bus
    #[serde(default)]
    pub chains: Vec<Chain>,
}

impl HiveConfig {
    /// Load from `path` and the environment
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load from `path` and environment variables starting with `prefix`
    pub fn load_with_prefix(path: impl AsRef<Path>, prefix: &str) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let config: HiveConfig = Figment::from(Serialized::defaults(HiveConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(prefix).split("__"))
            .extract()?;

        tracing::debug!(
            path = %path.display(),
            bees = config.bees.len(),
            chains = config.chains.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse a TOML string, without environment overrides
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(Figment::from(Serialized::defaults(HiveConfig::default()))
            .merge(Toml::string(content))
            .extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [bus]
        capacity = 32

        [[bees]]
        name = "extractor"
        class = "htmlextractbee"

        [[bees]]
        name = "twitter"
        class = "twitterbee"
        description = "Main account"
        options = { access_token = "abc", consumer_key = "key" }

        [[chains]]
        name = "share-links"
        event = { bee = "extractor", name = "info_extracted" }

        [[chains.actions]]
        bee = "twitter"
        name = "tweet"
        options = { status = "Reading: {{.title}}" }
    "#;

    #[test]
    fn test_parse_sample() {
        let config = HiveConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.bus.capacity, 32);
        assert_eq!(config.bus.subscriber_capacity, BusConfig::default().subscriber_capacity);
        assert_eq!(config.bees.len(), 2);
        assert_eq!(config.bees[1].description, "Main account");
        assert_eq!(config.bees[1].options["access_token"], serde_json::json!("abc"));
        assert_eq!(config.chains[0].actions[0].name, "tweet");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HiveConfig::from_toml("").unwrap();
        assert!(config.bees.is_empty());
        assert_eq!(config.bus.capacity, BusConfig::default().capacity);
    }

    #[test]
    fn test_load_file_with_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        // SAFETY: the prefix is unique to this test
        unsafe { std::env::set_var("HIVE_CFGTEST_BUS__SUBSCRIBER_CAPACITY", "7") };
        let config = HiveConfig::load_with_prefix(file.path(), "HIVE_CFGTEST_").unwrap();
        unsafe { std::env::remove_var("HIVE_CFGTEST_BUS__SUBSCRIBER_CAPACITY") };

        assert_eq!(config.bus.capacity, 32);
        assert_eq!(config.bus.subscriber_capacity, 7);
        assert_eq!(config.bees[0].class, "htmlextractbee");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = HiveConfig::load(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[[bees]]\nname = 5\n").unwrap();
        assert!(matches!(
            HiveConfig::load_with_prefix(file.path(), "HIVE_CFGTEST_INVALID_"),
            Err(ConfigError::Invalid(_))
        ));
    }
}

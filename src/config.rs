use {
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    // Reset trackers kept around for the next work items
    pub max_pooled_trackers: usize,

    // Stop collecting when the stream goes quiet for this long
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,

    // Emit a progress line every N completed work items (0 disables)
    pub progress_interval: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_pooled_trackers: 64,
            idle_timeout: Some(Duration::from_secs(30)),
            progress_interval: 1000,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [collector]
            max_pooled_trackers = 8
            idle_timeout = "1500ms"
            progress_interval = 10
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.collector.max_pooled_trackers, 8);
        assert_eq!(config.collector.idle_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.collector.progress_interval, 10);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = toml::from_str("[collector]\nmax_pooled_trackers = 2\n")
            .expect("valid toml");
        let defaults = CollectorConfig::default();

        assert_eq!(config.collector.max_pooled_trackers, 2);
        assert_eq!(config.collector.idle_timeout, defaults.idle_timeout);
        assert_eq!(config.collector.progress_interval, defaults.progress_interval);

        let empty: Config = toml::from_str("").expect("empty toml");
        assert_eq!(empty.collector.max_pooled_trackers, defaults.max_pooled_trackers);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/getwork-timing.toml").expect_err("missing file");
        assert!(matches!(err, ConfigError::FileReadError(_)));
    }

    #[test]
    fn test_rejects_bad_duration() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[collector]\nidle_timeout = \"soon\"\n");
        assert!(result.is_err());
    }
}

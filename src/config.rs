use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ScraperError};
use crate::pipeline::processing::years::{
    YearHeuristics, DEFAULT_MAX_VALUE_LENGTH, DEFAULT_MAX_YEARS_IN_VALUE,
};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub category_mapping_url: String,
    pub scraping: ScrapingConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
    pub refine: RefineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://www.cia.gov/the-world-factbook".to_string(),
            category_mapping_url:
                "https://www.cia.gov/the-world-factbook/page-data/sq/d/2962548448.json".to_string(),
            scraping: ScrapingConfig::default(),
            logging: LoggingConfig::default(),
            paths: PathsConfig::default(),
            refine: RefineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
    /// Pause after each successful request
    pub rate_limit_delay_ms: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_secs: 2,
            request_timeout_secs: 30,
            rate_limit_delay_ms: 1000,
        }
    }
}

impl ScrapingConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_to_file: bool,
    pub log_to_console: bool,
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: true,
            log_to_console: true,
            directory: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub snapshots_dir: PathBuf,
    pub category_mapping: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            snapshots_dir: PathBuf::from("data/snapshots"),
            category_mapping: PathBuf::from("data/index/category_mapping.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    pub max_year_value_length: usize,
    pub max_years_in_value: usize,
    /// Refuse to refine when the category mapping is empty
    pub require_categories: bool,
    /// Promote keyed values to `key_value_pairs` / `key_sub_values`
    pub classify_structures: bool,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_year_value_length: DEFAULT_MAX_VALUE_LENGTH,
            max_years_in_value: DEFAULT_MAX_YEARS_IN_VALUE,
            require_categories: false,
            classify_structures: true,
        }
    }
}

impl RefineConfig {
    pub fn heuristics(&self) -> YearHeuristics {
        YearHeuristics {
            max_value_length: self.max_year_value_length,
            max_years_in_value: self.max_years_in_value,
        }
    }
}

impl Config {
    /// Load from `path`. A missing file gives the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ScraperError::Config("base_url must not be empty".to_string()));
        }
        if self.refine.max_years_in_value == 0 {
            return Err(ScraperError::Config(
                "refine.max_years_in_value must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

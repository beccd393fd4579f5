use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, DEFAULT_REGISTER_PATH};
use crate::error::{RegisterError, Result};
use crate::pipeline::processing::categorize::{default_category_rules, default_platform_rules, CategoryRule, PlatformRule};
use crate::pipeline::processing::duplicates::DuplicateConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub register: RegisterConfig,
    pub duplicates: DuplicateConfig,
    /// Ordered crime-type keyword table; first match wins
    pub categories: Vec<CategoryRule>,
    /// Ordered platform keyword table used when a record names no platform
    pub platforms: Vec<PlatformRule>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    pub path: PathBuf,
    pub high_value_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            register: RegisterConfig::default(),
            duplicates: DuplicateConfig::default(),
            categories: default_category_rules(),
            platforms: default_platform_rules(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_REGISTER_PATH),
            high_value_threshold: 50_000.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_prefix: "complaint_register.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `$COMPLAINT_REGISTER_CONFIG` or
    /// `complaint_register.toml`. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = Path::new(&config_path);
        if !path.exists() {
            debug!("No config file at '{}', using defaults", config_path);
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            RegisterError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&config_content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.register.high_value_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(RegisterError::Config(format!(
                "register.high_value_threshold must be a non-negative number, got {}",
                threshold
            )));
        }
        self.duplicates.validate()?;
        if self.categories.iter().any(|c| c.keywords.is_empty()) {
            return Err(RegisterError::Config("every [[categories]] entry needs at least one keyword".to_string()));
        }
        if self.platforms.iter().any(|p| p.keywords.is_empty() || p.name.trim().is_empty()) {
            return Err(RegisterError::Config("every [[platforms]] entry needs a name and keywords".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CrimeType;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.register.high_value_threshold, 50_000.0);
        assert_eq!(config.duplicates.date_tolerance_days, 7);
        assert_eq!(config.categories.first().map(|c| c.crime_type), Some(CrimeType::UpiFraud));
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = Config::from_toml(
            r#"
            [register]
            high_value_threshold = 100000.0

            [duplicates]
            date_tolerance_days = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.register.high_value_threshold, 100_000.0);
        assert_eq!(config.register.path, PathBuf::from(DEFAULT_REGISTER_PATH));
        assert_eq!(config.duplicates.date_tolerance_days, 3);
        assert!((config.duplicates.amount_tolerance - 0.10).abs() < f64::EPSILON);
    }

    #[test]
    fn custom_category_table_replaces_default() {
        let config = Config::from_toml(
            r#"
            [[categories]]
            crime_type = "Job_Scam"
            keywords = ["part time", "task"]
            "#,
        )
        .unwrap();
        assert_eq!(config.categories.len(), 1);
        assert_eq!(config.categories[0].crime_type, CrimeType::JobScam);
    }

    #[test]
    fn rejects_out_of_range_similarity() {
        let err = Config::from_toml(
            r#"
            [duplicates]
            name_similarity_threshold = 1.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RegisterError::Config(_)));
    }
}

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RfmError};
use crate::models::TableGroup;

/// Dump file extensions accepted by the reader
pub const DUMP_EXTENSIONS: [&str; 3] = [".sql", ".gz", ".sql.gz"];

/// Application configuration, built once and passed into each pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub export: ExportConfig,
    pub rfm: RfmConfig,
    pub logging: LoggingConfig,
    /// Table groups checked for completeness in every dump
    pub table_groups: Vec<TableGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned for candidate dump files
    pub dump_dir: String,
    /// Directory receiving one subfolder per run
    pub output_dir: String,
    /// Location of the ephemeral staging database file
    pub staging_db: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Maximum data rows per output workbook; more rows roll into numbered files
    pub max_rows_per_file: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfmConfig {
    /// Number of equal-population quantile bands per metric (quintiles by default)
    pub quantile_bands: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                dump_dir: "./dump".to_string(),
                output_dir: "./output".to_string(),
                staging_db: "./db/converted.db".to_string(),
            },
            export: ExportConfig {
                max_rows_per_file: 500_000,
            },
            rfm: RfmConfig { quantile_bands: 5 },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            table_groups: vec![
                TableGroup {
                    name: "wp".to_string(),
                    tables: vec![
                        "users".to_string(),
                        "wc_order_stats".to_string(),
                        "usermeta".to_string(),
                        "wc_customer_lookup".to_string(),
                    ],
                },
                TableGroup {
                    name: "avanse".to_string(),
                    tables: vec![
                        "avans_log_score".to_string(),
                        "avans_log_refs".to_string(),
                    ],
                },
            ],
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, optional files, and `RFM_*` environment
    /// variables, in increasing precedence.
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&AppConfig::default())
            .map_err(|e| RfmError::InvalidConfig(e.to_string()))?;

        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("RFM").separator("__"))
            .build()
            .map_err(|e| RfmError::InvalidConfig(format!("failed to load configuration: {e}")))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| RfmError::InvalidConfig(format!("failed to deserialize configuration: {e}")))?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.export.max_rows_per_file == 0 {
            return Err(RfmError::InvalidConfig(
                "max_rows_per_file must be greater than 0".to_string(),
            ));
        }

        if self.rfm.quantile_bands < 2 {
            return Err(RfmError::InvalidConfig(
                "quantile_bands must be at least 2".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(RfmError::InvalidConfig(format!(
                "invalid log level: {}. Must be one of: {valid_levels:?}",
                self.logging.level
            )));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(RfmError::InvalidConfig(format!(
                "invalid log format: {}. Must be one of: {valid_formats:?}",
                self.logging.format
            )));
        }

        for group in &self.table_groups {
            if group.name.trim().is_empty() {
                return Err(RfmError::InvalidConfig(
                    "table group name cannot be empty".to_string(),
                ));
            }
            if group.tables.is_empty() {
                return Err(RfmError::InvalidConfig(format!(
                    "table group '{}' has no required tables",
                    group.name
                )));
            }
        }

        Ok(())
    }

    /// Look up a table group by name
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&TableGroup> {
        self.table_groups.iter().find(|g| g.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.export.max_rows_per_file, 500_000);
        assert_eq!(config.rfm.quantile_bands, 5);
        assert_eq!(config.table_groups.len(), 2);
        assert_eq!(config.table_groups[0].name, "wp");
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.rfm.quantile_bands = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_group_lookup() {
        let config = AppConfig::default();
        let wp = config.group("wp").expect("wp group missing");
        assert!(wp.tables.contains(&"wc_customer_lookup".to_string()));
        assert!(config.group("nope").is_none());
    }
}

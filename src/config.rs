use anyhow::Result;
use config::{Config, Environment, File, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::aggregation::LabelPolicy;
use crate::validation::InputValidator;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub reporting: ReportingConfig,
    pub export: ExportConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub table_name: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
    pub create_if_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub request_body_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub window_minutes: u32,
    pub spam_min_frequency: u64,
    pub not_spam_min_frequency: u64,
    pub default_to_latest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub stream_timeout_secs: u64,
    pub empty_sentinel: bool,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    pub max_items: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/sms.db".to_string(),
                table_name: "sms_data".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
                create_if_missing: true,
            },
            server: ServerConfig {
                bind_addr: "0.0.0.0:8000".to_string(),
                request_body_limit_bytes: 1024 * 1024,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            reporting: ReportingConfig {
                window_minutes: 60,
                spam_min_frequency: 20,
                not_spam_min_frequency: 30,
                default_to_latest: true,
            },
            export: ExportConfig {
                stream_timeout_secs: 300,
                empty_sentinel: false,
                channel_capacity: 64,
            },
            feedback: FeedbackConfig { max_items: 1000 },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Same as [`AppConfig::load`], with an extra explicit file layered last
    pub fn load_from(extra_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        // Start with default values
        for (key, value) in Self::default() {
            builder = builder
                .set_default(key.as_str(), value)
                .map_err(|e| anyhow::anyhow!("Failed to set default {}: {}", key, e))?;
        }

        builder = builder
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Add environment variables with prefix, e.g. SMS_REPORT_DATABASE__URL
            .add_source(
                Environment::with_prefix("SMS_REPORT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }
        InputValidator::validate_table_name(&self.database.table_name)
            .map_err(|e| anyhow::anyhow!("Invalid table_name: {}", e))?;

        // Validate server config
        if self.server.bind_addr.trim().is_empty() {
            return Err(anyhow::anyhow!("bind_addr cannot be empty"));
        }
        if self.server.request_body_limit_bytes == 0 {
            return Err(anyhow::anyhow!("request_body_limit_bytes must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate reporting config
        if self.reporting.window_minutes == 0 {
            return Err(anyhow::anyhow!("window_minutes must be greater than 0"));
        }
        if self.reporting.spam_min_frequency == 0 || self.reporting.not_spam_min_frequency == 0 {
            return Err(anyhow::anyhow!("label frequency thresholds must be greater than 0"));
        }

        // Validate export config
        if self.export.stream_timeout_secs == 0 {
            return Err(anyhow::anyhow!("stream_timeout_secs must be greater than 0"));
        }
        if self.export.channel_capacity == 0 {
            return Err(anyhow::anyhow!("channel_capacity must be greater than 0"));
        }

        // Validate feedback config
        if self.feedback.max_items == 0 {
            return Err(anyhow::anyhow!("max_items must be greater than 0"));
        }

        Ok(())
    }

    /// Get database path from environment or config, without the `sqlite:` scheme
    pub fn get_database_path(&self) -> String {
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone());
        url.trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .to_string()
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }

    /// Width of the default query window, also the maximum allowed span
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.reporting.window_minutes))
    }

    /// Labeling thresholds
    pub const fn label_policy(&self) -> LabelPolicy {
        LabelPolicy {
            spam_min_frequency: self.reporting.spam_min_frequency,
            not_spam_min_frequency: self.reporting.not_spam_min_frequency,
        }
    }

    /// Deadline for a single streamed export
    pub const fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export.stream_timeout_secs)
    }
}

impl IntoIterator for AppConfig {
    type Item = (String, Value);
    type IntoIter = std::collections::hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        let mut map = std::collections::HashMap::new();

        // Flatten the configuration into key-value pairs
        map.insert("database.url".to_string(), Value::from(self.database.url));
        map.insert("database.table_name".to_string(), Value::from(self.database.table_name));
        map.insert("database.max_connections".to_string(), Value::from(u64::from(self.database.max_connections)));
        map.insert("database.connection_timeout_secs".to_string(), Value::from(self.database.connection_timeout_secs));
        map.insert("database.create_if_missing".to_string(), Value::from(self.database.create_if_missing));

        map.insert("server.bind_addr".to_string(), Value::from(self.server.bind_addr));
        map.insert("server.request_body_limit_bytes".to_string(), Value::from(self.server.request_body_limit_bytes as u64));

        map.insert("logging.level".to_string(), Value::from(self.logging.level));
        if let Some(file_path) = self.logging.file_path {
            map.insert("logging.file_path".to_string(), Value::from(file_path));
        }
        map.insert("logging.format".to_string(), Value::from(self.logging.format));

        map.insert("reporting.window_minutes".to_string(), Value::from(u64::from(self.reporting.window_minutes)));
        map.insert("reporting.spam_min_frequency".to_string(), Value::from(self.reporting.spam_min_frequency));
        map.insert("reporting.not_spam_min_frequency".to_string(), Value::from(self.reporting.not_spam_min_frequency));
        map.insert("reporting.default_to_latest".to_string(), Value::from(self.reporting.default_to_latest));

        map.insert("export.stream_timeout_secs".to_string(), Value::from(self.export.stream_timeout_secs));
        map.insert("export.empty_sentinel".to_string(), Value::from(self.export.empty_sentinel));
        map.insert("export.channel_capacity".to_string(), Value::from(self.export.channel_capacity as u64));

        map.insert("feedback.max_items".to_string(), Value::from(self.feedback.max_items as u64));

        map.into_iter()
    }
}

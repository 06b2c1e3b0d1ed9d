//! Configuration management for the capture workflow.
//!
//! This module handles loading and validating configuration from environment
//! variables and configuration files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the capture workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Resolution service HTTP configuration
    pub http: HttpConfig,

    /// Camera capture configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Resolution service endpoints and request tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Base URL of the resolution service (e.g., "https://app.example.com")
    pub base_url: String,

    /// Barcode scan submission endpoint
    #[serde(default = "default_scan_path")]
    pub scan_path: String,

    /// Label OCR job creation endpoint
    #[serde(default = "default_job_create_path")]
    pub job_create_path: String,

    /// Candidate fetch endpoint (by draft id)
    #[serde(default = "default_draft_path")]
    pub draft_path: String,

    /// OCR job result endpoint (by job id)
    #[serde(default = "default_job_result_path")]
    pub job_result_path: String,

    /// Barcode commit endpoint
    #[serde(default = "default_scan_commit_path")]
    pub scan_commit_path: String,

    /// Label manual commit endpoint
    #[serde(default = "default_manual_commit_path")]
    pub manual_commit_path: String,

    /// Manual search entry point for the no-match path
    #[serde(default = "default_manual_search_path")]
    pub manual_search_path: String,

    /// Cookie holding the anti-forgery token
    #[serde(default = "default_csrf_cookie")]
    pub csrf_cookie: String,

    /// Header carrying the anti-forgery token on mutating calls
    #[serde(default = "default_csrf_header")]
    pub csrf_header: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Redirect target when a successful commit omits one
    #[serde(default = "default_redirect")]
    pub default_redirect: String,
}

/// Camera capture configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// JPEG quality for the encoded still frame (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Upper bound on waiting for a stream readiness signal before the
    /// shoot control is enabled anyway
    #[serde(default = "default_readiness_fallback_ms")]
    pub readiness_fallback_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to include source code location
    #[serde(default)]
    pub include_location: bool,
}

// Default value functions
fn default_scan_path() -> String {
    "/record/api/scan/barcode/".to_string()
}
fn default_job_create_path() -> String {
    "/record/api/ocr/job/create/".to_string()
}
fn default_draft_path() -> String {
    "/record/api/scan/draft/".to_string()
}
fn default_job_result_path() -> String {
    "/record/api/ocr/job/result/".to_string()
}
fn default_scan_commit_path() -> String {
    "/record/api/scan/commit/".to_string()
}
fn default_manual_commit_path() -> String {
    "/record/api/ocr/job/commit-manual/".to_string()
}
fn default_manual_search_path() -> String {
    "/record/".to_string()
}
fn default_csrf_cookie() -> String {
    "csrftoken".to_string()
}
fn default_csrf_header() -> String {
    "X-CSRFToken".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_redirect() -> String {
    "/home/".to_string()
}
fn default_jpeg_quality() -> u8 {
    92
}
fn default_readiness_fallback_ms() -> u64 {
    700
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            readiness_fallback_ms: default_readiness_fallback_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            include_location: false,
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default config file (config/default.toml)
    /// 2. Environment-specific config (config/{env}.toml)
    /// 3. Environment variables (prefixed with MEALSCAN_)
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Start with default config
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Override with environment variables (e.g., MEALSCAN_HTTP__BASE_URL)
            .add_source(
                Environment::with_prefix("MEALSCAN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Create configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("MEALSCAN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.http.base_url.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "http.base_url".to_string(),
            ));
        }
        if !self.http.base_url.starts_with("http://") && !self.http.base_url.starts_with("https://")
        {
            return Err(ConfigValidationError::InvalidValue {
                field: "http.base_url".to_string(),
                message: "URL must start with http:// or https://".to_string(),
            });
        }

        if self.http.csrf_cookie.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "http.csrf_cookie".to_string(),
            ));
        }

        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(ConfigValidationError::InvalidValue {
                field: "capture.jpeg_quality".to_string(),
                message: "JPEG quality must be in 1..=100".to_string(),
            });
        }

        Ok(())
    }
}

impl HttpConfig {
    /// Get request timeout as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Join a configured path onto the base URL.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            path
        )
    }
}

impl CaptureConfig {
    /// Get the readiness fallback bound as Duration.
    pub fn readiness_fallback(&self) -> Duration {
        Duration::from_millis(self.readiness_fallback_ms)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Initialize the tracing/logging subsystem.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing::Level;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("mealscan={}", level).parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer().pretty()).init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> WorkflowConfig {
        WorkflowConfig {
            http: HttpConfig {
                base_url: "https://app.example.com".to_string(),
                scan_path: default_scan_path(),
                job_create_path: default_job_create_path(),
                draft_path: default_draft_path(),
                job_result_path: default_job_result_path(),
                scan_commit_path: default_scan_commit_path(),
                manual_commit_path: default_manual_commit_path(),
                manual_search_path: default_manual_search_path(),
                csrf_cookie: default_csrf_cookie(),
                csrf_header: default_csrf_header(),
                request_timeout_secs: 30,
                default_redirect: default_redirect(),
            },
            capture: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = create_test_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_base_url() {
        let mut config = create_test_config();
        config.http.base_url = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_invalid_base_url_scheme() {
        let mut config = create_test_config();
        config.http.base_url = "ftp://app.example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_jpeg_quality() {
        let mut config = create_test_config();
        config.capture.jpeg_quality = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_url_for_strips_duplicate_slash() {
        let mut config = create_test_config();
        config.http.base_url = "https://app.example.com/".to_string();
        assert_eq!(
            config.http.url_for("/record/api/scan/barcode/"),
            "https://app.example.com/record/api/scan/barcode/"
        );
    }

    #[test]
    fn test_default_endpoints() {
        let config = create_test_config();
        assert_eq!(config.http.scan_path, "/record/api/scan/barcode/");
        assert_eq!(config.http.job_create_path, "/record/api/ocr/job/create/");
        assert_eq!(config.http.csrf_cookie, "csrftoken");
    }
}

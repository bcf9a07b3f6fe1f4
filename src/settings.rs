//! Process-level settings for the importer binary and the Datadog client.

use crate::error::{ImporterError, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Datadog API key, sent as `DD-API-KEY`
    pub api_key: Option<String>,

    /// Datadog application key, sent as `DD-APPLICATION-KEY`
    pub app_key: Option<String>,

    /// Datadog site, e.g. `datadoghq.com` or `datadoghq.eu`
    pub site: String,

    /// Per-request timeout for the HTTP client
    pub timeout: Duration,

    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            app_key: None,
            site: "datadoghq.com".to_string(),
            timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        let mut settings = Settings::default();

        settings.api_key = env::var("DD_API_KEY").ok();
        settings.app_key = env::var("DD_APP_KEY")
            .or_else(|_| env::var("DD_APPLICATION_KEY"))
            .ok();

        if let Ok(site) = env::var("DD_SITE") {
            if site.trim().is_empty() {
                return Err(ImporterError::Config("invalid DD_SITE: empty".to_string()));
            }
            settings.site = site.trim().to_string();
        }

        if let Ok(secs) = env::var("DD_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| ImporterError::Config(format!("invalid DD_TIMEOUT_SECS: {e}")))?;
            settings.timeout = Duration::from_secs(secs);
        }

        if let Ok(level) = env::var("IMPORTER_LOG_LEVEL") {
            settings.log_level = level;
        }

        if let Ok(format) = env::var("IMPORTER_LOG_FORMAT") {
            settings.log_format = parse_log_format(&format)?;
        }

        Ok(settings)
    }

    /// Base URL of the Datadog API for the configured site.
    pub fn api_base_url(&self) -> String {
        format!("https://api.{}", self.site)
    }
}

fn parse_log_format(value: &str) -> Result<LogFormat> {
    match value.to_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "pretty" => Ok(LogFormat::Pretty),
        other => Err(ImporterError::Config(format!(
            "invalid IMPORTER_LOG_FORMAT: {other} (expected 'json' or 'pretty')"
        ))),
    }
}

//! Structured logging setup.

use std::fmt;

use serde::{Deserialize, Serialize};
use tandem_core::RequestContext;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Output format for logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (for production/log aggregation).
    #[default]
    Json,
    /// Human-readable format (for development).
    Human,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Human => write!(f, "human"),
        }
    }
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `tandem_render=debug,info`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn human() -> Self {
        Self {
            format: LogFormat::Human,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// The effective filter: `RUST_LOG` if set, else `level`.
    pub fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| LoggingError::Filter {
            filter: self.level.clone(),
            message: e.to_string(),
        })
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = config.filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match config.format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Human => builder.compact().try_init(),
    };
    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(format = %config.format, level = %config.level, "logging initialized");
    Ok(())
}

/// Span for everything done on behalf of `cx`.
pub fn request_span(cx: &RequestContext) -> tracing::Span {
    tracing::info_span!(
        "request",
        request_id = %cx.request_id(),
        method = %cx.method(),
        path = %cx.path(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_toml_shape() {
        let config: LoggingConfig = serde_json::from_str(r#"{"format": "human"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Human);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_invalid_filter() {
        let config = LoggingConfig::human().with_level("tandem=notalevel");
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(config.filter(), Err(LoggingError::Filter { .. })));
        }
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::human().with_level("warn");
        let _ = init_logging(&config);
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::AlreadyInitialized(_))
        ));
    }
}

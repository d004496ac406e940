//! Application configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_actions::DEFAULT_ACTION_PATH;
use tandem_core::TandemError;
use tandem_observability::{LogFormat, LoggingConfig};
use tandem_render::{RenderOptions, DEFAULT_SUSPENSE_TIMEOUT};
use tandem_streaming::{FlushPolicy, HeadContent, Shell};

/// Query parameter that selects the frame stream instead of the document.
pub const DEFAULT_STREAM_PARAM: &str = "_rsc";

/// Configuration for a Tandem application.
///
/// Every field has a default, so a TOML file only needs the keys it
/// changes:
///
/// ```toml
/// name = "shop"
/// title = "My Shop"
/// stylesheet = "/pkg/style.css"
/// suspense_timeout_ms = 5000
/// flush = "every_frame"
///
/// [logging]
/// format = "human"
/// level = "tandem_render=debug,info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemConfig {
    /// Application name.
    pub name: String,
    /// Default page title.
    pub title: String,
    /// Stylesheet linked from every document.
    pub stylesheet: Option<String>,
    /// Client entry script; its tag carries the frame stream url.
    pub bootstrap: Option<String>,
    /// Stream frames as subtrees settle. When off, frame responses are
    /// sent in one piece once the render completes.
    pub streaming: bool,
    /// Deadline for deferred subtrees, in milliseconds. 0 disables it.
    pub suspense_timeout_ms: u64,
    pub flush: FlushPolicy,
    /// Path of the action endpoint.
    pub action_path: String,
    /// Query parameter requesting the frame stream.
    pub stream_param: String,
    pub logging: LoggingConfig,
}

impl Default for TandemConfig {
    fn default() -> Self {
        Self {
            name: "TandemApp".to_string(),
            title: "Tandem".to_string(),
            stylesheet: None,
            bootstrap: None,
            streaming: true,
            suspense_timeout_ms: DEFAULT_SUSPENSE_TIMEOUT.as_millis() as u64,
            flush: FlushPolicy::default(),
            action_path: DEFAULT_ACTION_PATH.to_string(),
            stream_param: DEFAULT_STREAM_PARAM.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TandemConfig {
    /// Create a new configuration with the given app name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML.
    pub fn from_toml_str(source: &str) -> Result<Self, TandemError> {
        let config: Self = toml::from_str(source).map_err(|e| TandemError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TandemError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| TandemError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Set the default page title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the stylesheet path.
    pub fn with_css(mut self, path: impl Into<String>) -> Self {
        self.stylesheet = Some(path.into());
        self
    }

    /// Set the client entry script.
    pub fn with_bootstrap(mut self, src: impl Into<String>) -> Self {
        self.bootstrap = Some(src.into());
        self
    }

    /// Enable or disable streaming.
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.streaming = enabled;
        self
    }

    /// Set the suspense deadline. `None` waits indefinitely.
    pub fn with_suspense_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.suspense_timeout_ms = timeout.map_or(0, |t| t.as_millis() as u64);
        self
    }

    pub fn with_flush(mut self, policy: FlushPolicy) -> Self {
        self.flush = policy;
        self
    }

    /// Move the action endpoint.
    pub fn with_action_path(mut self, path: impl Into<String>) -> Self {
        self.action_path = path.into();
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Human-readable logs, for development.
    pub fn with_human_logs(mut self) -> Self {
        self.logging.format = LogFormat::Human;
        self
    }

    /// Check the values a TOML file could get wrong.
    pub fn validate(&self) -> Result<(), TandemError> {
        if !self.action_path.starts_with('/') {
            return Err(TandemError::Config(format!(
                "action_path must start with '/': {}",
                self.action_path
            )));
        }
        if self.stream_param.is_empty() {
            return Err(TandemError::Config("stream_param must not be empty".into()));
        }
        Ok(())
    }

    /// Suspense deadline, if any.
    pub fn suspense_timeout(&self) -> Option<Duration> {
        (self.suspense_timeout_ms > 0).then(|| Duration::from_millis(self.suspense_timeout_ms))
    }

    /// Options for the primary render pass.
    pub fn render_options(&self) -> RenderOptions {
        match self.suspense_timeout() {
            Some(timeout) => RenderOptions::new().with_suspense_timeout(timeout),
            None => RenderOptions::new().without_timeout(),
        }
    }

    /// Document template for SSR responses.
    pub fn shell(&self) -> Shell {
        let mut head = HeadContent::new(self.title.as_str())
            .with_meta("viewport", "width=device-width, initial-scale=1");
        if let Some(css) = &self.stylesheet {
            head = head.with_stylesheet(css);
        }
        let shell = Shell::new(head);
        match &self.bootstrap {
            Some(src) => shell.with_bootstrap(src.as_str()),
            None => shell,
        }
    }
}

//! Configuration management for chathook
//!
//! This module handles loading, parsing, and validating configuration
//! from a YAML file with CLI overrides.

use crate::error::{ChathookError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Main configuration structure for chathook
///
/// Holds everything needed to run a chat session: the webhook endpoint,
/// screenshot capture settings, and chat storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Webhook endpoint configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Screenshot capture configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Chat storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Webhook endpoint configuration
///
/// The webhook is the external HTTP endpoint that produces assistant
/// replies. It accepts a JSON POST and returns either a JSON object with
/// a `message`/`answer` field or plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook endpoint URL
    #[serde(default = "default_webhook_url")]
    pub url: Url,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Number of send attempts per message
    ///
    /// 1 means a single send with no retry; higher values retry transient
    /// failures with exponential backoff (2^attempt seconds between tries).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_webhook_url() -> Url {
    // Endpoint the assistant backend is deployed at; override in config.
    Url::parse("https://n8n-5v15.onrender.com/webhook/chat").expect("default webhook URL is valid")
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    1
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: default_webhook_url(),
            timeout_seconds: default_timeout_seconds(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

/// Screenshot capture configuration
///
/// Capture runs an external command that writes a PNG to the path given
/// as its last argument. Disabled by default; message sending proceeds
/// without a screenshot when capture is off or fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Whether screenshot capture is attempted before each send
    #[serde(default)]
    pub enabled: bool,

    /// External capture command, e.g. "gnome-screenshot -f" or "screencapture"
    #[serde(default)]
    pub command: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: None,
        }
    }
}

/// Chat storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Override for the chat store directory
    ///
    /// When unset, the platform data directory is used. The
    /// `CHATHOOK_STORE_PATH` environment variable takes precedence over
    /// both.
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// A missing file is not an error; defaults are used so the binary
    /// works out of the box.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChathookError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| ChathookError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ChathookError::Config` for values that cannot work at
    /// runtime (zero attempts, zero timeout, capture enabled without a
    /// command).
    pub fn validate(&self) -> Result<()> {
        if self.webhook.retry_attempts == 0 {
            return Err(
                ChathookError::Config("webhook.retry_attempts must be at least 1".to_string())
                    .into(),
            );
        }

        if self.webhook.timeout_seconds == 0 {
            return Err(
                ChathookError::Config("webhook.timeout_seconds must be at least 1".to_string())
                    .into(),
            );
        }

        if self.capture.enabled && self.capture.command.is_none() {
            return Err(ChathookError::Config(
                "capture.enabled requires capture.command to be set".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_webhook_values() {
        let config = Config::default();
        assert_eq!(config.webhook.timeout_seconds, 30);
        assert_eq!(config.webhook.retry_attempts, 1);
        assert_eq!(config.webhook.url.path(), "/webhook/chat");
    }

    #[test]
    fn test_capture_disabled_by_default() {
        let config = Config::default();
        assert!(!config.capture.enabled);
        assert!(config.capture.command.is_none());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/chathook.yaml").unwrap();
        assert_eq!(config.webhook.retry_attempts, 1);
    }

    #[test]
    fn test_load_parses_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "webhook:\n  url: \"http://localhost:9999/hook\"\n  retry_attempts: 3\ncapture:\n  enabled: true\n  command: \"screencapture\"\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.webhook.url.as_str(), "http://localhost:9999/hook");
        assert_eq!(config.webhook.retry_attempts, 3);
        assert!(config.capture.enabled);
        assert_eq!(config.capture.command.as_deref(), Some("screencapture"));
        // Unspecified fields fall back to defaults
        assert_eq!(config.webhook.timeout_seconds, 30);
    }

    #[test]
    fn test_load_rejects_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "webhook: [not a map").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.webhook.retry_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.webhook.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_capture_without_command() {
        let mut config = Config::default();
        config.capture.enabled = true;
        config.capture.command = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.webhook.url, config.webhook.url);
        assert_eq!(parsed.webhook.retry_attempts, config.webhook.retry_attempts);
    }
}

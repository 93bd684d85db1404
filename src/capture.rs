//! Screenshot capture boundary
//!
//! The platform capture facility lives behind the [`CaptureBackend`] trait
//! as a single awaitable call producing a PNG data URL. [`ScreenCapturer`]
//! wraps a backend with the failure contract the send flow relies on:
//! errors are classified into a user-visible notice and an empty image,
//! and capture failure never blocks message sending.

use crate::config::CaptureConfig;
use crate::error::{ChathookError, Result};
use async_trait::async_trait;
use base64::Engine;
use tokio::process::Command;

/// Prefix stripped from successful captures before upload
pub const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Result of a capture attempt
///
/// `image` is the base64 PNG payload without the data-URL prefix. `notice`
/// is a message for the user when capture failed; the flow continues
/// without the attachment either way.
#[derive(Debug, Default)]
pub struct CaptureResult {
    /// Base64-encoded PNG, prefix stripped; `None` when capture produced nothing
    pub image: Option<String>,

    /// User-visible failure notice, shown inline in the chat
    pub notice: Option<String>,
}

/// Awaitable wrapper over the platform screenshot facility
///
/// Implementations resolve the capture target and return a PNG data URL,
/// or `None` when there is nothing to capture (no active target).
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Capture the active screen as a PNG data URL
    async fn capture(&self) -> Result<Option<String>>;
}

/// Backend that runs an external screenshot command
///
/// The configured command is invoked with a temporary output path appended
/// as its final argument and must write a PNG there.
pub struct CommandCapture {
    command: String,
}

impl CommandCapture {
    /// Build a backend from configuration
    ///
    /// Returns `None` when capture is disabled or no command is configured,
    /// which the capturer treats as "nothing to capture".
    pub fn from_config(config: &CaptureConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        config.command.as_ref().map(|command| Self {
            command: command.clone(),
        })
    }
}

#[async_trait]
impl CaptureBackend for CommandCapture {
    async fn capture(&self) -> Result<Option<String>> {
        let dir = tempfile_dir()?;
        let out_path = dir.join("capture.png");

        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ChathookError::Capture("empty capture command".to_string()))?;

        let output = Command::new(program)
            .args(parts)
            .arg(&out_path)
            .output()
            .await
            .map_err(|e| ChathookError::Capture(format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(
                ChathookError::Capture(format!("{} failed: {}", program, stderr.trim())).into(),
            );
        }

        let png = std::fs::read(&out_path)
            .map_err(|e| ChathookError::Capture(format!("no capture output: {}", e)))?;
        let _ = std::fs::remove_file(&out_path);

        let encoded = base64::engine::general_purpose::STANDARD.encode(png);
        Ok(Some(format!("{}{}", DATA_URL_PREFIX, encoded)))
    }
}

fn tempfile_dir() -> Result<std::path::PathBuf> {
    let dir = std::env::temp_dir().join("chathook");
    std::fs::create_dir_all(&dir)
        .map_err(|e| ChathookError::Capture(format!("cannot create temp dir: {}", e)))?;
    Ok(dir)
}

/// Screenshot capturer with graceful failure semantics
pub struct ScreenCapturer<B: CaptureBackend> {
    backend: Option<B>,
}

impl<B: CaptureBackend> ScreenCapturer<B> {
    /// Wrap a backend; `None` means capture is unavailable
    pub fn new(backend: Option<B>) -> Self {
        Self { backend }
    }

    /// Capture the screen, never failing the caller
    ///
    /// On success the data-URL prefix is stripped and the payload returned.
    /// Backend errors are classified by message substring into a notice:
    /// permission problems, internal platform errors, or a generic
    /// passthrough. An unavailable backend resolves empty with no notice.
    pub async fn capture(&self) -> CaptureResult {
        let backend = match &self.backend {
            Some(backend) => backend,
            None => {
                tracing::debug!("No capture backend configured");
                return CaptureResult::default();
            }
        };

        match backend.capture().await {
            Ok(Some(data_url)) => {
                let image = data_url
                    .strip_prefix(DATA_URL_PREFIX)
                    .unwrap_or(&data_url)
                    .to_string();
                CaptureResult {
                    image: Some(image),
                    notice: None,
                }
            }
            Ok(None) => {
                tracing::debug!("No capture target available");
                CaptureResult::default()
            }
            Err(e) => {
                tracing::error!("Screenshot capture failed: {}", e);
                CaptureResult {
                    image: None,
                    notice: Some(classify_failure(&e.to_string())),
                }
            }
        }
    }
}

/// Map a capture error message onto a user-visible notice
fn classify_failure(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("permission") {
        "Screenshot failed: Permission denied. Please ensure the capture command has the necessary permissions.".to_string()
    } else if lower.contains("internal") {
        "Screenshot failed: Internal error. Please try again.".to_string()
    } else {
        format!("Screenshot failed: {}", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted backend for exercising the capturer contract
    struct FakeBackend {
        result: std::sync::Mutex<Option<Result<Option<String>>>>,
    }

    impl FakeBackend {
        fn returning(result: Result<Option<String>>) -> Self {
            Self {
                result: std::sync::Mutex::new(Some(result)),
            }
        }
    }

    #[async_trait]
    impl CaptureBackend for FakeBackend {
        async fn capture(&self) -> Result<Option<String>> {
            self.result
                .lock()
                .unwrap()
                .take()
                .expect("capture called more than once")
        }
    }

    #[tokio::test]
    async fn test_capture_strips_data_url_prefix() {
        let backend = FakeBackend::returning(Ok(Some(format!("{}QUJD", DATA_URL_PREFIX))));
        let capturer = ScreenCapturer::new(Some(backend));

        let result = capturer.capture().await;
        assert_eq!(result.image.as_deref(), Some("QUJD"));
        assert!(result.notice.is_none());
    }

    #[tokio::test]
    async fn test_capture_passes_through_unprefixed_payload() {
        let backend = FakeBackend::returning(Ok(Some("QUJD".to_string())));
        let capturer = ScreenCapturer::new(Some(backend));

        let result = capturer.capture().await;
        assert_eq!(result.image.as_deref(), Some("QUJD"));
    }

    #[tokio::test]
    async fn test_capture_no_target_resolves_empty() {
        let backend = FakeBackend::returning(Ok(None));
        let capturer = ScreenCapturer::new(Some(backend));

        let result = capturer.capture().await;
        assert!(result.image.is_none());
        assert!(result.notice.is_none());
    }

    #[tokio::test]
    async fn test_capture_without_backend_resolves_empty() {
        let capturer: ScreenCapturer<FakeBackend> = ScreenCapturer::new(None);
        let result = capturer.capture().await;
        assert!(result.image.is_none());
        assert!(result.notice.is_none());
    }

    #[tokio::test]
    async fn test_permission_error_classified() {
        let backend = FakeBackend::returning(Err(ChathookError::Capture(
            "screen recording permission not granted".to_string(),
        )
        .into()));
        let capturer = ScreenCapturer::new(Some(backend));

        let result = capturer.capture().await;
        assert!(result.image.is_none());
        let notice = result.notice.unwrap();
        assert!(notice.contains("Permission denied"));
    }

    #[tokio::test]
    async fn test_internal_error_classified() {
        let backend = FakeBackend::returning(Err(ChathookError::Capture(
            "internal compositor error".to_string(),
        )
        .into()));
        let capturer = ScreenCapturer::new(Some(backend));

        let result = capturer.capture().await;
        let notice = result.notice.unwrap();
        assert!(notice.contains("Internal error"));
    }

    #[tokio::test]
    async fn test_other_errors_passed_through() {
        let backend = FakeBackend::returning(Err(ChathookError::Capture(
            "display not found".to_string(),
        )
        .into()));
        let capturer = ScreenCapturer::new(Some(backend));

        let result = capturer.capture().await;
        let notice = result.notice.unwrap();
        assert!(notice.starts_with("Screenshot failed:"));
        assert!(notice.contains("display not found"));
    }

    #[test]
    fn test_command_capture_disabled_config_yields_none() {
        let config = CaptureConfig {
            enabled: false,
            command: Some("screencapture".to_string()),
        };
        assert!(CommandCapture::from_config(&config).is_none());
    }

    #[test]
    fn test_command_capture_enabled_without_command_yields_none() {
        let config = CaptureConfig {
            enabled: true,
            command: None,
        };
        assert!(CommandCapture::from_config(&config).is_none());
    }

    #[test]
    fn test_command_capture_from_valid_config() {
        let config = CaptureConfig {
            enabled: true,
            command: Some("screencapture -x".to_string()),
        };
        assert!(CommandCapture::from_config(&config).is_some());
    }
}

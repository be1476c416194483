use std::time::Duration;

use crate::utils::canvas_client::CanvasError;

pub const BASE_URL_ENV: &str = "CANVAS_BASE_URL";
pub const TOKEN_ENV: &str = "CANVAS_TOKEN";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Largest body `fetch_binary` will buffer before giving up.
pub const DEFAULT_MAX_DOWNLOAD_BYTES: usize = 500 * 1024 * 1024; // 500 MiB

/// What the binary downloader does after the authenticated attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFallback {
    /// Retry anonymously on any failure (transport errors included).
    AnyError,
    /// Retry anonymously only on 401/403.
    AuthErrorsOnly,
}

/// Process-wide Canvas connection settings. Read-only once the server starts.
#[derive(Clone)]
pub struct CanvasConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
    pub download_fallback: DownloadFallback,
    pub max_download_bytes: usize,
}

impl std::fmt::Debug for CanvasConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("download_fallback", &self.download_fallback)
            .field("max_download_bytes", &self.max_download_bytes)
            .finish()
    }
}

impl CanvasConfig {
    /// Validates raw values coming from CLI flags or the environment.
    /// Trailing slashes are stripped from the base URL so paths can be appended verbatim.
    pub fn new(base_url: Option<String>, token: Option<String>) -> Result<Self, CanvasError> {
        let base_url = base_url
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CanvasError::Config(format!("Missing {} (or --base-url)", BASE_URL_ENV)))?;
        let token = token
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CanvasError::Config(format!("Missing {} (or --token)", TOKEN_ENV)))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&base_url)
            .map_err(|e| CanvasError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CanvasError::Config(format!(
                "Base URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        Ok(Self {
            base_url,
            token,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            download_fallback: DownloadFallback::AnyError,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_download_fallback(mut self, fallback: DownloadFallback) -> Self {
        self.download_fallback = fallback;
        self
    }

    pub fn with_max_download_bytes(mut self, max_bytes: usize) -> Self {
        self.max_download_bytes = max_bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slashes() {
        let cfg = CanvasConfig::new(
            Some("https://canvas.example.edu///".to_string()),
            Some("tok".to_string()),
        )
        .unwrap();
        assert_eq!(cfg.base_url, "https://canvas.example.edu");
        assert_eq!(cfg.download_fallback, DownloadFallback::AnyError);
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_download_bytes, DEFAULT_MAX_DOWNLOAD_BYTES);
    }

    #[test]
    fn missing_base_url_names_the_variable() {
        let err = CanvasConfig::new(None, Some("tok".to_string())).unwrap_err();
        assert!(matches!(err, CanvasError::Config(_)));
        assert!(err.to_string().contains("CANVAS_BASE_URL"));
    }

    #[test]
    fn blank_token_is_rejected() {
        let err = CanvasConfig::new(Some("https://x.test".to_string()), Some("  ".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CANVAS_TOKEN"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = CanvasConfig::new(Some("ftp://x.test".to_string()), Some("tok".to_string()))
            .unwrap_err();
        assert!(matches!(err, CanvasError::Config(_)));
    }

    #[test]
    fn unparseable_base_url_is_a_config_error() {
        let err = CanvasConfig::new(Some("not a url".to_string()), Some("tok".to_string()))
            .unwrap_err();
        assert!(matches!(err, CanvasError::Config(_)));
        assert!(err.to_string().contains("Invalid base URL"));
    }

    #[test]
    fn debug_output_hides_token() {
        let cfg =
            CanvasConfig::new(Some("https://x.test".to_string()), Some("secret".to_string())).unwrap();
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("secret"));
    }
}

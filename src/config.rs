use std::env;
use std::time::Duration;

use crate::error::{ReportError, Result};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Boundary configuration for the structured extraction call. All values are
/// externally supplied; credentials are never hardcoded.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Model selector passed to the provider.
    pub model: String,
    pub api_key: String,
    /// Override for the provider endpoint, used by tests and proxies.
    pub base_url: Option<String>,
    /// Upper bound on total call attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_backoff: Duration,
    /// Wall-clock bound per attempt.
    pub request_timeout: Duration,
}

impl ExtractionConfig {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Read configuration from the environment. `GEMINI_API_KEY` is required;
    /// everything else falls back to defaults.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| ReportError::ExtractionConfig("GEMINI_API_KEY must be set".to_string()))?;
        let model = env::var("EXTRACTION_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let mut config = Self::new(model, api_key);
        if let Some(attempts) = read_env_u64("EXTRACTION_MAX_ATTEMPTS")? {
            config.max_attempts = attempts as u32;
        }
        if let Some(millis) = read_env_u64("EXTRACTION_BASE_BACKOFF_MS")? {
            config.base_backoff = Duration::from_millis(millis);
        }
        if let Some(secs) = read_env_u64("EXTRACTION_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

fn read_env_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ReportError::ExtractionConfig(format!("{} must be an integer", name))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExtractionConfig::new("gemini-2.0-flash", "test-key");
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.base_backoff, DEFAULT_BASE_BACKOFF);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_builders() {
        let config = ExtractionConfig::new("gemini-2.0-flash", "test-key")
            .with_max_attempts(5)
            .with_base_backoff(Duration::from_millis(10))
            .with_request_timeout(Duration::from_secs(5))
            .with_base_url("http://localhost:8080");

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_backoff, Duration::from_millis(10));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8080"));
    }
}

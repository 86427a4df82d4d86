use std::fmt;
use std::time::Duration;

use crate::errors::DifyError;

const DEFAULT_BASE_URL: &str = "https://api.dify.ai";

/// Configuration for a `DifyClient`.
///
/// The `Debug` output redacts the API key.
#[derive(Clone)]
pub struct DifyClientConfig {
    /// App API key used for bearer auth.
    pub api_key: String,
    /// Base URL of the Dify service, without the `/v1` suffix.
    ///
    /// Useful for self-hosted deployments or local test servers.
    pub base_url: String,
    /// HTTP timeout for requests. Applies to the whole response, so keep it
    /// generous for long streams.
    pub timeout: Duration,
    /// Bounded channel size between the stream decoder task and the consumer.
    pub stream_buffer_capacity: usize,
}

impl fmt::Debug for DifyClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DifyClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("stream_buffer_capacity", &self.stream_buffer_capacity)
            .finish()
    }
}

impl DifyClientConfig {
    /// Creates a config with defaults and a provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(300),
            stream_buffer_capacity: 1,
        }
    }

    /// Builds a config from the environment, loading `.env` first if present.
    ///
    /// - `DIFY_API_KEY` (required)
    /// - `DIFY_BASE_URL` (optional)
    /// - `DIFY_TIMEOUT_SECS` (optional)
    pub fn from_env() -> Result<Self, DifyError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("DIFY_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(DifyError::Config("missing DIFY_API_KEY".into()));
        }
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("DIFY_BASE_URL")
            && !base_url.trim().is_empty()
        {
            config = config.base_url(base_url.trim());
        }
        if let Ok(raw) = std::env::var("DIFY_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                DifyError::Config(format!("invalid DIFY_TIMEOUT_SECS {raw:?}: {e}"))
            })?;
            config = config.timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the stream channel capacity.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DifyError> {
        if self.api_key.trim().is_empty() {
            return Err(DifyError::Config("api_key must not be empty".into()));
        }
        if self.base_url.trim().is_empty() {
            return Err(DifyError::Config("base_url must not be empty".into()));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(DifyError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

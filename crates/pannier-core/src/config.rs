//! Engine configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Default timeout for remote calls; a timed-out call is a transport error
/// and falls into the offline-write path.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default connectivity probe interval
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);
/// Default debounce window before a connectivity transition is published
const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Runtime configuration for the sync engine and its clients.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Remote service base URL, e.g. `http://localhost:3000`
    pub api_url: String,
    /// WebSocket endpoint for the push channel; derived from `api_url`
    /// unless overridden
    pub ws_url: String,
    /// Path of the local cache database
    pub db_path: PathBuf,
    /// Timeout applied to every remote call
    pub request_timeout: Duration,
    /// Connectivity probe interval
    pub probe_interval: Duration,
    /// Stability window before a connectivity transition is published
    pub debounce: Duration,
}

impl EngineConfig {
    /// Create a configuration with defaults for everything but the
    /// service URL and cache path.
    pub fn new(api_url: impl Into<String>, db_path: impl Into<PathBuf>) -> Result<Self> {
        let api_url = normalize_api_url(api_url.into())?;
        let ws_url = derive_ws_url(&api_url);
        Ok(Self {
            api_url,
            ws_url,
            db_path: db_path.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
        })
    }

    /// Override the WebSocket endpoint
    #[must_use]
    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    /// Override the remote call timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the probe cadence
    #[must_use]
    pub const fn with_probe_interval(mut self, interval: Duration, debounce: Duration) -> Self {
        self.probe_interval = interval;
        self.debounce = debounce;
        self
    }
}

fn normalize_api_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("API URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "API URL must include http:// or https://".to_string(),
        ))
    }
}

/// The push channel lives on the same host as the REST API
fn derive_ws_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}

//! Connectivity monitoring
//!
//! Tracks whether the remote service is reachable and publishes transitions
//! to subscribers. The probe loop debounces, so a flapping link produces at
//! most one online transition per stable period.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Current online/offline status plus a subscription for transitions.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial status
    #[must_use]
    pub fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Current status
    #[must_use]
    pub fn current(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe to status transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Publish a status observation. Subscribers are only woken on an
    /// actual transition.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Probes the environment for reachability of the remote service
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// One reachability observation
    async fn check(&self) -> bool;
}

/// Probe that considers the device online when the service answers HTTP
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Build a probe against the given URL (typically the API base URL)
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Transport(error.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn check(&self) -> bool {
        // Any response counts; only failing to get one means offline
        self.client.head(&self.url).send().await.is_ok()
    }
}

/// Spawn the polling loop feeding a monitor.
///
/// A changed observation is published only after it has stayed stable for
/// the debounce window.
pub fn spawn_probe(
    monitor: ConnectivityMonitor,
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    debounce: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut candidate = monitor.current();
        let mut stable_since = tokio::time::Instant::now();
        loop {
            tokio::time::sleep(interval).await;
            let observed = probe.check().await;
            if observed != candidate {
                candidate = observed;
                stable_since = tokio::time::Instant::now();
                continue;
            }
            if candidate != monitor.current() && stable_since.elapsed() >= debounce {
                tracing::info!(online = candidate, "Connectivity changed");
                monitor.set_online(candidate);
            }
        }
    })
}

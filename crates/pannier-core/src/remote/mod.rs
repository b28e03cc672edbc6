//! Remote service client: CRUD calls and the push notification channel

mod http;
mod push;

pub use http::HttpRemoteClient;
pub use push::{ChangeKind, PushHandle, PushMessage};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::Item;

/// Contract of the remote inventory service, consumed by the sync engine.
///
/// Implementations distinguish validation errors (the service rejected the
/// entity content) from transport errors (service unreachable, timeout,
/// malformed response); the engine's offline fallback depends on it.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch the full collection
    async fn list(&self, credential: &str) -> Result<Vec<Item>>;

    /// Create an entity; the service assigns the canonical identifier
    async fn create(&self, credential: &str, item: &Item) -> Result<Item>;

    /// Update an existing entity, keyed by its identifier
    async fn update(&self, credential: &str, item: &Item) -> Result<Item>;

    /// Delete an entity by identifier
    async fn delete(&self, credential: &str, id: &str) -> Result<()>;

    /// Open the push notification channel. Notifications are forwarded to
    /// `sender` in arrival order until the returned handle is closed.
    async fn open_channel(
        &self,
        credential: &str,
        sender: mpsc::UnboundedSender<PushMessage>,
    ) -> Result<PushHandle>;
}

//! Push notification channel over WebSocket
//!
//! The remote service broadcasts every change it applies to clients holding
//! an open channel. The channel authenticates itself right after the
//! handshake and then only reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::models::Item;

/// Kind of change announced by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A change notification received over the push channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub payload: Item,
}

#[derive(Serialize)]
struct AuthMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: AuthPayload<'a>,
}

#[derive(Serialize)]
struct AuthPayload<'a> {
    token: &'a str,
}

/// Handle to an open push channel.
///
/// Closing (or dropping) the handle tears the reader task down exactly once;
/// a notification racing the close is dropped, never delivered.
pub struct PushHandle {
    closed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PushHandle {
    pub(crate) fn new(closed: Arc<AtomicBool>, task: Option<JoinHandle<()>>) -> Self {
        Self { closed, task }
    }

    /// Close the channel. No further messages are delivered after this
    /// returns.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Connect, authenticate, and start forwarding notifications to `sender`.
pub(crate) async fn open(
    ws_url: &str,
    credential: &str,
    sender: mpsc::UnboundedSender<PushMessage>,
) -> Result<PushHandle> {
    tracing::debug!("Opening push channel to {ws_url}");
    let (ws_stream, _response) = connect_async(ws_url)
        .await
        .map_err(|error| Error::Transport(error.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    let auth = serde_json::to_string(&AuthMessage {
        kind: "authorization",
        payload: AuthPayload { token: credential },
    })?;
    write
        .send(Message::Text(auth))
        .await
        .map_err(|error| Error::Transport(error.to_string()))?;

    let closed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&closed);
    let task = tokio::spawn(async move {
        while let Some(message) = read.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            match serde_json::from_str::<PushMessage>(&text) {
                Ok(push) => {
                    // A close may have raced the read; drop instead of deliver
                    if flag.load(Ordering::SeqCst) {
                        break;
                    }
                    if sender.send(push).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!("Ignoring malformed push message: {error}");
                }
            }
        }
        tracing::debug!("Push channel reader stopped");
    });

    Ok(PushHandle::new(closed, Some(task)))
}

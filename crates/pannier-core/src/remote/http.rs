//! HTTP implementation of the remote API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::models::Item;
use crate::util::{compact_text, is_http_url, normalize_text_option};

use super::push;
use super::{PushHandle, PushMessage, RemoteApi};

/// Client for the inventory service's REST and WebSocket endpoints.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    base_url: String,
    ws_url: String,
    client: reqwest::Client,
}

impl HttpRemoteClient {
    /// Build a client for the given API base URL and WebSocket endpoint.
    pub fn new(
        base_url: impl Into<String>,
        ws_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Transport(error.to_string()))?;

        Ok(Self {
            base_url,
            ws_url: ws_url.into(),
            client,
        })
    }

    fn items_url(&self) -> String {
        format!("{}/api/item", self.base_url)
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/api/item/{id}", self.base_url)
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteClient {
    async fn list(&self, credential: &str) -> Result<Vec<Item>> {
        let response = self
            .client
            .get(self.items_url())
            .bearer_auth(credential)
            .send()
            .await
            .map_err(map_transport)?;
        let response = check_status(response).await?;
        response.json::<Vec<Item>>().await.map_err(map_transport)
    }

    async fn create(&self, credential: &str, item: &Item) -> Result<Item> {
        let response = self
            .client
            .post(self.items_url())
            .bearer_auth(credential)
            .json(item)
            .send()
            .await
            .map_err(map_transport)?;
        let response = check_status(response).await?;
        response.json::<Item>().await.map_err(map_transport)
    }

    async fn update(&self, credential: &str, item: &Item) -> Result<Item> {
        let id = item
            .id
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("update requires an identifier".to_string()))?;
        let response = self
            .client
            .put(self.item_url(id))
            .bearer_auth(credential)
            .json(item)
            .send()
            .await
            .map_err(map_transport)?;
        let response = check_status(response).await?;
        response.json::<Item>().await.map_err(map_transport)
    }

    async fn delete(&self, credential: &str, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.item_url(id))
            .bearer_auth(credential)
            .send()
            .await
            .map_err(map_transport)?;
        check_status(response).await?;
        Ok(())
    }

    async fn open_channel(
        &self,
        credential: &str,
        sender: mpsc::UnboundedSender<PushMessage>,
    ) -> Result<PushHandle> {
        push::open(&self.ws_url, credential, sender).await
    }
}

fn map_transport(error: reqwest::Error) -> Error {
    Error::Transport(error.to_string())
}

/// Classify a non-success response.
///
/// The service answers validation failures with 400 and a `{message}` body;
/// every other failure status is treated as transport-class so the entity
/// stays recoverable through the offline path.
fn map_status_error(status: StatusCode, body: &str) -> Error {
    if status == StatusCode::BAD_REQUEST {
        Error::Validation(parse_error_message(status, body))
    } else {
        Error::Transport(format!("HTTP {}", status.as_u16()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_status_error(status, &body))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = normalize_text_option(payload.message) {
            return format!("{} ({})", message, status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("base URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

//! Shared helpers for CLI commands

use std::sync::Arc;

use pannier_core::cache::{CacheStore, SqliteCacheStore};
use pannier_core::net::{ConnectivityMonitor, ConnectivityProbe, HttpProbe};
use pannier_core::remote::{HttpRemoteClient, RemoteApi};
use pannier_core::store::SyncStore;
use pannier_core::{Item, SyncEngine};

use crate::config::CliConfig;
use crate::error::CliError;

/// One CLI invocation's engine, wired to the real service and cache.
pub struct Session {
    pub engine: Arc<SyncEngine>,
    pub monitor: ConnectivityMonitor,
}

/// Build the engine and take a single connectivity observation.
///
/// One-shot commands don't poll; the observation decides whether the engine
/// routes to the service or the local cache. `watch` adds the polling loop
/// on top.
pub async fn open_session(config: &CliConfig) -> Result<Session, CliError> {
    let remote = Arc::new(HttpRemoteClient::new(
        &config.engine.api_url,
        &config.engine.ws_url,
        config.engine.request_timeout,
    )?);
    let cache = Arc::new(SqliteCacheStore::open(&config.engine.db_path)?);
    let probe = HttpProbe::new(&config.engine.api_url, config.engine.request_timeout)?;
    let online = probe.check().await;
    tracing::debug!(online, "Connectivity probe result");
    let monitor = ConnectivityMonitor::new(online);

    let engine = SyncEngine::new(
        remote as Arc<dyn RemoteApi>,
        cache as Arc<dyn CacheStore>,
        SyncStore::new(),
        monitor.clone(),
        config.credential.clone(),
    );

    Ok(Session { engine, monitor })
}

/// Load the collection and look an item up by identifier.
pub async fn resolve_item(session: &Session, id: &str) -> Result<Item, CliError> {
    session.engine.fetch().await?;
    session
        .engine
        .store()
        .snapshot()
        .items
        .into_iter()
        .find(|item| item.id.as_deref() == Some(id))
        .ok_or_else(|| CliError::ItemNotFound(id.to_string()))
}

/// Print the deferred-sync notice when the last change stayed local.
pub fn note_pending_sync(session: &Session) {
    if session.engine.store().snapshot().pending_sync {
        println!("Saved offline; changes will sync when the service is reachable.");
    }
}

/// Render items the way `pannier list` prints them.
pub fn format_item_lines(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let id = item.id.as_deref().unwrap_or("-");
            let warranty = if item.warranty {
                "warranty"
            } else {
                "no warranty"
            };
            let mut line = format!(
                "{id}  {} ({}, {warranty})  {:.2}",
                item.name, item.condition, item.price
            );
            if let (Some(lat), Some(lng)) = (item.lat, item.lng) {
                line.push_str(&format!("  @ {lat:.4},{lng:.4}"));
            }
            line
        })
        .collect()
}

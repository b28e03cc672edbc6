use std::sync::Arc;

use pannier_core::net::{spawn_probe, HttpProbe};

use crate::commands::common::open_session;
use crate::config::CliConfig;
use crate::error::CliError;

/// Keep the engine running: poll connectivity, hold the push channel open,
/// and print the collection every time the state changes.
pub async fn run_watch(config: &CliConfig) -> Result<(), CliError> {
    let session = open_session(config).await?;
    session.engine.start().await;

    let probe = Arc::new(HttpProbe::new(
        &config.engine.api_url,
        config.engine.request_timeout,
    )?);
    let probe_task = spawn_probe(
        session.monitor.clone(),
        probe,
        config.engine.probe_interval,
        config.engine.debounce,
    );

    session.engine.fetch().await?;
    let mut updates = session.engine.store().subscribe();
    println!("Watching for changes; press Ctrl-C to stop.");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                let online = if state.online { "online" } else { "offline" };
                let pending = if state.pending_sync { ", pending sync" } else { "" };
                println!("[{online}] {} items{pending}", state.items.len());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    probe_task.abort();
    session.engine.shutdown().await;
    Ok(())
}

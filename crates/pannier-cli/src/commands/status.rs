use serde::Serialize;

use crate::commands::common::open_session;
use crate::config::CliConfig;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusReport {
    online: bool,
    items: usize,
    pending_sync: bool,
    fetch_error: Option<String>,
    save_error: Option<String>,
    delete_error: Option<String>,
}

pub async fn run_status(as_json: bool, config: &CliConfig) -> Result<(), CliError> {
    let session = open_session(config).await?;
    session.engine.fetch().await?;
    let state = session.engine.store().snapshot();

    let report = StatusReport {
        online: state.online,
        items: state.items.len(),
        pending_sync: state.pending_sync,
        fetch_error: state.fetch_error,
        save_error: state.save_error,
        delete_error: state.delete_error,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("online: {}", if report.online { "yes" } else { "no" });
        println!("items: {}", report.items);
        println!(
            "pending sync: {}",
            if report.pending_sync { "yes" } else { "no" }
        );
        if let Some(error) = &report.fetch_error {
            println!("last fetch error: {error}");
        }
    }

    Ok(())
}

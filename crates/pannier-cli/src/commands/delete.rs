use crate::commands::common::{open_session, resolve_item};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_delete(id: &str, config: &CliConfig) -> Result<(), CliError> {
    let session = open_session(config).await?;
    let item = resolve_item(&session, id).await?;

    session.engine.delete(item).await?;
    println!("{id}");

    if session.engine.store().snapshot().pending_sync {
        println!("Deleted offline; changes will sync when the service is reachable.");
    }
    Ok(())
}

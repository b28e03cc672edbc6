use crate::commands::common::open_session;
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_sync(config: &CliConfig) -> Result<(), CliError> {
    let session = open_session(config).await?;

    if !session.monitor.current() {
        println!("Offline; nothing can sync right now.");
        return Ok(());
    }

    let report = session.engine.reconcile().await?;
    println!(
        "Reconciled {} cached records: {} created, {} updated, {} unchanged, {} failed",
        report.examined, report.created, report.updated, report.unchanged, report.failed
    );
    Ok(())
}

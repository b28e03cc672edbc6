use crate::commands::common::{format_item_lines, open_session};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_list(as_json: bool, config: &CliConfig) -> Result<(), CliError> {
    let session = open_session(config).await?;
    session.engine.fetch().await?;
    let state = session.engine.store().snapshot();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&state.items)?);
    } else {
        for line in format_item_lines(&state.items) {
            println!("{line}");
        }
        if state.pending_sync {
            println!("(some changes are local-only and will sync later)");
        }
    }

    Ok(())
}

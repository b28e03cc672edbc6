use pannier_core::Item;

use crate::commands::common::{note_pending_sync, open_session};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_add(
    name: String,
    condition: String,
    price: f64,
    warranty: bool,
    lat: Option<f64>,
    lng: Option<f64>,
    config: &CliConfig,
) -> Result<(), CliError> {
    let session = open_session(config).await?;

    let item = Item {
        id: None,
        name,
        condition,
        warranty,
        price,
        lat,
        lng,
    };
    let saved = session.engine.save(item).await?;

    if let Some(id) = saved.id.as_deref() {
        println!("{id}");
    }
    note_pending_sync(&session);
    Ok(())
}

use pannier_core::Item;

use crate::commands::common::{note_pending_sync, open_session, resolve_item};
use crate::config::CliConfig;
use crate::error::CliError;

/// Field changes requested on the command line; `None` leaves a field as-is.
#[derive(Debug, Default)]
pub struct EditFields {
    pub name: Option<String>,
    pub condition: Option<String>,
    pub price: Option<f64>,
    pub warranty: Option<bool>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl EditFields {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.condition.is_none()
            && self.price.is_none()
            && self.warranty.is_none()
            && self.lat.is_none()
            && self.lng.is_none()
    }

    fn apply(self, item: &mut Item) {
        if let Some(name) = self.name {
            item.name = name;
        }
        if let Some(condition) = self.condition {
            item.condition = condition;
        }
        if let Some(price) = self.price {
            item.price = price;
        }
        if let Some(warranty) = self.warranty {
            item.warranty = warranty;
        }
        if let Some(lat) = self.lat {
            item.lat = Some(lat);
        }
        if let Some(lng) = self.lng {
            item.lng = Some(lng);
        }
    }
}

pub async fn run_edit(id: &str, fields: EditFields, config: &CliConfig) -> Result<(), CliError> {
    if fields.is_empty() {
        return Err(CliError::NoChanges);
    }

    let session = open_session(config).await?;
    let mut item = resolve_item(&session, id).await?;
    fields.apply(&mut item);

    let saved = session.engine.save(item).await?;
    if let Some(id) = saved.id.as_deref() {
        println!("{id}");
    }
    note_pending_sync(&session);
    Ok(())
}

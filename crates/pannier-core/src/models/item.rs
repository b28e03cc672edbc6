//! Inventory item model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix for identifiers minted on this device before the remote service
/// has assigned a canonical one.
const LOCAL_ID_PREFIX: &str = "local-";

/// A single managed inventory record.
///
/// The identifier is absent until the record has been persisted somewhere:
/// either the remote service assigned a canonical id, or an offline save
/// minted a local one (see [`mint_local_id`]). Once assigned, the identifier
/// never changes for the life of the record.
///
/// The JSON shape follows the remote service's wire format: the identifier
/// serializes as `_id` and optional fields are omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier, absent until first persisted
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Condition, e.g. "new" or "used"
    pub condition: String,
    /// Whether the item still carries a warranty
    pub warranty: bool,
    /// Asking price, must be >= 1
    pub price: f64,
    /// Geolocation latitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    /// Geolocation longitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl Item {
    /// Compare the fields reconciliation cares about (name, condition,
    /// warranty, price). Identifier and geolocation are excluded.
    #[must_use]
    pub fn same_fields(&self, other: &Self) -> bool {
        self.name == other.name
            && self.condition == other.condition
            && self.warranty == other.warranty
            && (self.price - other.price).abs() < f64::EPSILON
    }

    /// Whether this item only exists on this device so far.
    #[must_use]
    pub fn has_local_id(&self) -> bool {
        self.id.as_deref().is_some_and(is_local_id)
    }
}

/// Mint a temporary identifier for an entity created while offline.
///
/// Local identifiers key cache storage until reconciliation replaces them
/// with a canonical one. The prefix keeps them distinguishable from server
/// identifiers and the UUID guarantees they are never reused.
#[must_use]
pub fn mint_local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4())
}

/// Check whether an identifier was minted locally.
#[must_use]
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

//! CLI error types

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] pannier_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Item not found for id: {0}")]
    ItemNotFound(String),
    #[error("No changes provided; pass at least one field option")]
    NoChanges,
    #[error("Set PANNIER_TOKEN to authenticate against the inventory service")]
    MissingToken,
}

//! pannier-core - Core library for Pannier
//!
//! This crate contains the offline-first synchronization engine shared by
//! all Pannier front ends: the entity model, the durable local cache, the
//! remote service client, connectivity monitoring, the sync state store,
//! and the reconciliation logic that merges offline changes back into the
//! remote service.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod net;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use models::Item;
pub use sync::{ReconcileReport, SyncEngine};

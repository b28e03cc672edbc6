//! Data models

mod item;

pub use item::{is_local_id, mint_local_id, Item};

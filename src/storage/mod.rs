//! `SQLite` storage layer.

pub mod events;
pub mod internal_id;
pub mod schema;
pub mod sqlite;

pub use sqlite::{MutationContext, SqliteStorage};

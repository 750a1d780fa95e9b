//! Fanclub Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod account;
pub mod catalog;
pub mod config;
pub mod db;
pub mod fan_content;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use account::{AccountStore, Role, SqliteAccountStore};
pub use catalog::{CatalogStore, SqliteCatalogStore};
pub use db::open_community_db;
pub use fan_content::{FanContentStore, SqliteFanContentStore};
pub use server::{run_server, RequestsLoggingLevel};

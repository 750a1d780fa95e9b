//! Accounts, roles, password credentials and session tokens.

mod auth;
mod models;
pub(crate) mod schema;
mod store;
mod trait_def;

pub use auth::{AuthTokenValue, FanclubHasher};
pub use models::{Account, Role};
pub use store::SqliteAccountStore;
pub use trait_def::AccountStore;

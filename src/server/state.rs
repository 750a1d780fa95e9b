use axum::extract::FromRef;

use crate::account::AccountStore;
use crate::catalog::CatalogStore;
use crate::fan_content::FanContentStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedCatalogStore = Arc<dyn CatalogStore>;
pub type GuardedFanContentStore = Arc<dyn FanContentStore>;
pub type GuardedAccountStore = Arc<dyn AccountStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub catalog_store: GuardedCatalogStore,
    pub fan_content_store: GuardedFanContentStore,
    pub account_store: GuardedAccountStore,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedCatalogStore {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog_store.clone()
    }
}

impl FromRef<ServerState> for GuardedFanContentStore {
    fn from_ref(input: &ServerState) -> Self {
        input.fan_content_store.clone()
    }
}

impl FromRef<ServerState> for GuardedAccountStore {
    fn from_ref(input: &ServerState) -> Self {
        input.account_store.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

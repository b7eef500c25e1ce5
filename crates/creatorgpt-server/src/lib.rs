//! CreatorGpt Server library
//!
//! Re-exports the server modules for use by the binary and integration tests.

use std::sync::Arc;

use creatorgpt::{AccountStore, Config, DocumentStore, Generator};

pub mod api;
pub mod db;
pub mod toggles;
pub mod tokens;

/// Shared application state
pub struct AppState {
    /// Backing document store
    pub store: Arc<dyn DocumentStore>,
    /// Email/password accounts kept in `store`
    pub accounts: AccountStore,
    /// Bearer tokens of signed-in users
    pub tokens: tokens::TokenStore,
    /// Like toggles currently running, per user and subject
    pub pending_toggles: toggles::PendingToggles,
    /// Answer generator used by `/solve`
    pub generator: Arc<dyn Generator>,
    /// Limits and transaction settings
    pub config: Config,
}

impl AppState {
    /// Build state over a store and a generator
    pub fn new(store: Arc<dyn DocumentStore>, generator: Arc<dyn Generator>, config: Config) -> Self {
        Self {
            accounts: AccountStore::new(store.clone()),
            store,
            tokens: tokens::TokenStore::default(),
            pending_toggles: toggles::PendingToggles::default(),
            generator,
            config,
        }
    }
}

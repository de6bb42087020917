//! MCP gateway library crate.
//!
//! The binary in `main.rs` wires these modules to a listener and the CLI;
//! integration tests in `tests/` drive them directly.

pub mod api;
pub mod config;
pub mod directory;
pub mod errors;
pub mod manifest;
pub mod mcp;
pub mod middleware;
pub mod models;
pub mod rest;
pub mod store;
pub mod tokens;

use std::sync::Arc;

use directory::UserDirectory;
use mcp::{Catalog, Dispatcher};
use middleware::gate::{AuthenticationGate, GatePolicy};
use store::KvStore;
use tokens::TokenService;

/// Shared application state passed to handlers.
pub struct AppState {
    pub config: config::Config,
    pub store: Arc<dyn KvStore>,
    pub tokens: TokenService,
    pub permissive: AuthenticationGate,
    pub strict: AuthenticationGate,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(
        config: config::Config,
        store: Arc<dyn KvStore>,
        directory: Arc<dyn UserDirectory>,
        catalog: Catalog,
    ) -> Self {
        let tokens = TokenService::new(store.clone(), directory)
            .with_policy(config.ttl_policy())
            .with_issuer(config.token_issuer.clone());
        let permissive = AuthenticationGate::new(GatePolicy::Permissive, store.clone(), tokens.clone());
        let strict = AuthenticationGate::new(GatePolicy::Strict, store.clone(), tokens.clone());
        let mut dispatcher = Dispatcher::new(Arc::new(catalog));
        if let Some(instructions) = &config.instructions {
            dispatcher = dispatcher.with_instructions(instructions.clone());
        }
        Self {
            config,
            store,
            tokens,
            permissive,
            strict,
            dispatcher,
        }
    }
}

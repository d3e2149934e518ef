pub mod error;
pub mod handlers;
pub mod password;
pub mod server;
pub mod service;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: service::CredentialService,
}

impl AppState {
    pub fn new(store: Arc<dyn store::CredentialStore>, store_timeout: Duration) -> Self {
        Self {
            service: service::CredentialService::new(store, store_timeout),
        }
    }
}

pub use error::CredentialError;
pub use server::{
    read_secret_file, resolve_data_dir, resolve_store_url, router, run, CorsPolicy, ServerConfig,
};

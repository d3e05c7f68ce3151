use std::sync::Arc;

use crate::config::Config;
use crate::metadata::{MetadataStore, SidecarMetadataStore};
use crate::tokens::{InMemoryTokenStore, TokenStore};

/// Shared by every connection task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<dyn TokenStore>,
    pub metadata: Arc<dyn MetadataStore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            tokens: Arc::new(InMemoryTokenStore::new()),
            metadata: Arc::new(SidecarMetadataStore),
        }
    }
}

//! Application state for the file-rag server

use std::sync::Arc;

use crate::collection::CollectionService;
use crate::config::RagConfig;
use crate::error::Result;
use crate::providers::Providers;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Collection lifecycle and question answering
    collections: CollectionService,
}

impl AppState {
    /// Create state with the providers selected in the configuration
    pub fn new(config: RagConfig) -> Result<Self> {
        let providers = Providers::from_config(&config)?;
        Self::with_providers(config, providers)
    }

    /// Create state with explicit providers
    pub fn with_providers(config: RagConfig, providers: Providers) -> Result<Self> {
        tracing::info!(
            "Initializing file-rag state (data dir: {})",
            config.storage.data_dir.display()
        );
        let collections = CollectionService::new(&config, providers)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                collections,
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    /// Get the collection service
    pub fn collections(&self) -> &CollectionService {
        &self.inner.collections
    }
}

pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::Config;
pub use error::{RecommendError, RecommendResult};
pub use models::*;

use anyhow::Result;
use crate::config::StorageBackend;
use crate::services::explanation::explainer_from_config;
use crate::services::lifecycle::LifecycleManager;
use crate::services::recommendation::RecommendationEngine;
use crate::services::refresh::{RefreshHandle, RefreshWorker};
use crate::services::serving::ServingService;
use crate::services::store::{CatalogStore, InMemoryStore, InteractionLog, PgStore, RecommendationStore, UserDirectory};
use std::sync::Arc;
use tracing::info;

/// One handle per store role. A single backend usually fills all four.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserDirectory>,
    pub catalog: Arc<dyn CatalogStore>,
    pub interactions: Arc<dyn InteractionLog>,
    pub recommendations: Arc<dyn RecommendationStore>,
}

impl Stores {
    pub fn memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            users: store.clone(),
            catalog: store.clone(),
            interactions: store.clone(),
            recommendations: store,
        }
    }

    pub fn postgres(store: Arc<PgStore>) -> Self {
        Self {
            users: store.clone(),
            catalog: store.clone(),
            interactions: store.clone(),
            recommendations: store,
        }
    }

    /// Opens the configured backend, running migrations and seeding as asked.
    pub async fn open(config: &Config) -> Result<Self> {
        match config.storage.backend {
            StorageBackend::Memory => {
                let store = if config.storage.seed_sample_data {
                    InMemoryStore::with_sample_data()
                } else {
                    InMemoryStore::new()
                };
                Ok(Self::memory(Arc::new(store)))
            }
            StorageBackend::Postgres => {
                let store = PgStore::connect(&config.postgres).await?;
                store.migrate().await?;
                if config.storage.seed_sample_data {
                    store.seed_sample_data().await?;
                }
                Ok(Self::postgres(Arc::new(store)))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<RecommendationEngine>,
    pub lifecycle: Arc<LifecycleManager>,
    pub refresh: RefreshHandle,
    pub serving: Arc<ServingService>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let stores = Stores::open(&config).await?;
        Ok(Self::with_stores(config, stores))
    }

    /// Wires the pipeline over existing stores. Must be called inside a tokio
    /// runtime since it starts the refresh worker.
    pub fn with_stores(config: Config, stores: Stores) -> Self {
        let config = Arc::new(config);
        let recommendation = &config.recommendation;

        let engine = Arc::new(RecommendationEngine::new(
            stores.users.clone(),
            stores.catalog.clone(),
            stores.interactions.clone(),
            recommendation,
        ));

        let lifecycle = Arc::new(LifecycleManager::new(
            stores.recommendations.clone(),
            stores.users.clone(),
            stores.catalog.clone(),
            stores.interactions.clone(),
            explainer_from_config(&config.explanation),
        ));

        let (refresh, _worker) = RefreshWorker::new(engine.clone(), lifecycle.clone(), recommendation.default_count)
            .spawn(recommendation.refresh_queue_capacity);

        let serving = Arc::new(ServingService::new(
            stores.users,
            stores.catalog,
            stores.interactions,
            stores.recommendations,
            engine.clone(),
            lifecycle.clone(),
            refresh.clone(),
            recommendation,
        ));

        info!(backend = ?config.storage.backend, "Recommendation pipeline ready");

        Self {
            config,
            engine,
            lifecycle,
            refresh,
            serving,
        }
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // A subscriber may already be installed by an embedding binary or test.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

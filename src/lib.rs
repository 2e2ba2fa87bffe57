pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{RecError, RecResult};
pub use models::*;

use anyhow::Result;
use config::StoreBackend;
use services::store::{
    EventCatalog, InMemoryEventCatalog, InMemoryInteractionStore, InMemoryProfileStore,
    InteractionStore, ProfileStore, RedisInteractionStore, RedisProfileStore,
};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<dyn EventCatalog>,
    pub interactions: Arc<dyn InteractionStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub aggregator: Arc<services::aggregator::PreferenceAggregator>,
    pub recorder: Arc<services::recorder::BehaviorRecorder>,
    pub recommendation_service: Arc<services::recommendation::RecommendationService>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let (interactions, profiles): (Arc<dyn InteractionStore>, Arc<dyn ProfileStore>) =
            match config.store.backend {
                StoreBackend::Memory => (
                    Arc::new(InMemoryInteractionStore::new()),
                    Arc::new(InMemoryProfileStore::new()),
                ),
                StoreBackend::Redis => {
                    let redis_client = Arc::new(redis::Client::open(config.redis.url.as_str())?);
                    let prefix = config.redis.key_prefix.clone();
                    (
                        Arc::new(RedisInteractionStore::new(redis_client.clone(), prefix.clone())),
                        Arc::new(RedisProfileStore::new(redis_client, prefix)),
                    )
                }
            };

        info!("Using {:?} store backend", config.store.backend);

        Ok(Self::with_stores(
            config,
            Arc::new(InMemoryEventCatalog::new()),
            interactions,
            profiles,
        ))
    }

    /// Wires the services over caller-provided stores.
    pub fn with_stores(
        config: Config,
        catalog: Arc<dyn EventCatalog>,
        interactions: Arc<dyn InteractionStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let config = Arc::new(config);

        let aggregator = Arc::new(services::aggregator::PreferenceAggregator::new(
            interactions.clone(),
            profiles.clone(),
            &config,
        ));

        let recorder = Arc::new(services::recorder::BehaviorRecorder::new(aggregator.clone()));

        let recommendation_service = Arc::new(services::recommendation::RecommendationService::new(
            catalog.clone(),
            aggregator.clone(),
            config.clone(),
        ));

        Self {
            config,
            catalog,
            interactions,
            profiles,
            aggregator,
            recorder,
            recommendation_service,
        }
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

use std::sync::Arc;

use crate::config::{Config, DispatchSettings};
use crate::engine::dispatcher::{Collaborators, Dispatcher};
use crate::engine::sentiment::{LexiconSentiment, SentimentScorer};
use crate::error::AppError;
use crate::geo::routing::{OpenRouteService, RoutingProvider, StraightLine};
use crate::observability::metrics::Metrics;
use crate::store::ingest::{ingest_providers, load_seed_file};
use crate::store::memory::{
    InMemoryInteractionLog, InMemoryProviderDirectory, InMemoryRequestStore,
    InMemoryWorkerDirectory,
};

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub metrics: Metrics,
}

/// Handles on the in-memory adapters, for seeding and inspection.
#[derive(Clone)]
pub struct InMemoryStores {
    pub providers: Arc<InMemoryProviderDirectory>,
    pub requests: Arc<InMemoryRequestStore>,
    pub workers: Arc<InMemoryWorkerDirectory>,
    pub history: Arc<InMemoryInteractionLog>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self {
            providers: Arc::new(InMemoryProviderDirectory::new()),
            requests: Arc::new(InMemoryRequestStore::new()),
            workers: Arc::new(InMemoryWorkerDirectory::new()),
            history: Arc::new(InMemoryInteractionLog::new()),
        }
    }
}

impl Default for InMemoryStores {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, metrics: Metrics) -> Self {
        Self {
            dispatcher,
            metrics,
        }
    }

    /// In-memory stores, straight-line routing and the lexicon scorer.
    pub fn in_memory(settings: DispatchSettings) -> (Self, InMemoryStores) {
        Self::in_memory_with(settings, Arc::new(StraightLine))
    }

    pub fn in_memory_with(
        settings: DispatchSettings,
        routing: Arc<dyn RoutingProvider>,
    ) -> (Self, InMemoryStores) {
        let stores = InMemoryStores::new();
        let metrics = Metrics::new();
        let collaborators = Collaborators {
            providers: stores.providers.clone(),
            requests: stores.requests.clone(),
            workers: stores.workers.clone(),
            history: stores.history.clone(),
            routing,
            sentiment: Arc::new(LexiconSentiment),
        };
        let dispatcher = Dispatcher::new(collaborators, settings, metrics.clone());
        (Self::new(dispatcher, metrics), stores)
    }

    /// Process wiring: routing from config, directories from the seed file.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let routing: Arc<dyn RoutingProvider> = match &config.ors_api_key {
            Some(key) => {
                tracing::info!(base_url = %config.ors_base_url, "road routing enabled");
                Arc::new(OpenRouteService::new(config.ors_base_url.clone(), key.clone()))
            }
            None => {
                tracing::info!("no routing key configured; using straight-line distances");
                Arc::new(StraightLine)
            }
        };

        let (state, stores) = Self::in_memory_with(config.dispatch_settings(), routing);

        if let Some(path) = &config.seed_path {
            let seed = load_seed_file(path)?;
            let scorer: &dyn SentimentScorer = &LexiconSentiment;
            for provider in ingest_providers(seed.providers, scorer) {
                stores.providers.insert(provider);
            }
            for worker in seed.workers {
                stores.workers.insert(worker);
            }
        }

        Ok(state)
    }
}

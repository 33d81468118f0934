//! Application state shared across handlers

use crate::config::Settings;
use crate::metrics::Metrics;
use crate::network::HttpClient;
use crate::observability::{Observer, Observers, TracingObserver};
use crate::planner::OpenAiPlanner;
use crate::search::{Search, SearchDispatcher};
use crate::transport::{HttpFlightFetcher, TransportRetryEngine};
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Global settings
    pub settings: Arc<Settings>,
    /// Request pipeline
    pub search: Arc<Search>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire the planner, fetcher, engine and dispatcher from settings
    pub fn new(settings: Settings, client: HttpClient) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new());

        let mut observers = Observers::new().with(Arc::new(TracingObserver));
        if settings.general.enable_metrics {
            observers = observers.with(metrics.clone());
        }
        let observers_len = observers.len();
        let observer: Arc<dyn Observer> = Arc::new(observers);

        let policy = settings.transport.retry_policy();
        let fetcher = HttpFlightFetcher::new(&settings.outgoing, &policy)?;
        let engine = TransportRetryEngine::new(
            Arc::new(fetcher),
            settings.transport.strategies.clone(),
            policy,
        )
        .with_observer(observer.clone());
        info!(
            "Transport engine: {} strategies, {} attempts each, {} observers",
            engine.strategies().len(),
            engine.policy().max_attempts(),
            observers_len
        );

        let dispatcher = SearchDispatcher::new(Arc::new(engine))
            .with_max_concurrency(settings.search.max_concurrency)
            .with_observer(observer);

        let planner = OpenAiPlanner::new(client, settings.planner.clone());
        let search = Search::new(Arc::new(planner), dispatcher)
            .with_deadline(settings.search.deadline());

        Ok(Self::from_parts(settings, search, metrics))
    }

    pub fn from_parts(settings: Settings, search: Search, metrics: Arc<Metrics>) -> Self {
        Self {
            settings: Arc::new(settings),
            search: Arc::new(search),
            metrics,
        }
    }

    /// Get instance name
    pub fn instance_name(&self) -> &str {
        &self.settings.general.instance_name
    }
}

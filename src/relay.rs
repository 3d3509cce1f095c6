use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use crate::config::AppConfig;
use crate::core::event_processor::{RouterControl, RouterWorker};
use crate::core::router::FailoverCore;
use crate::core::state_machine::RouterPhase;
use crate::distribution::broadcast::{BroadcastDistributor, TickStream};
use crate::distribution::snapshot::{HealthSnapshot, SnapshotPublisher};
use crate::error::Result;
use crate::interfaces::previous_close::PreviousCloseLookup;
use crate::interfaces::symbol_catalog::{StaticSymbolCatalog, SymbolCatalog};
use crate::price_infra::connectors::{
    HttpQuoteFetcher, JsonStreamProtocol, PollingFallbackSource, QuoteFetcher, ReconnectSignal,
    StreamingIngestionClient,
};
use crate::price_infra::enricher::TickEnricher;
use crate::price_infra::symbols::SymbolWatcher;
use crate::types::symbol::Symbol;
use crate::types::tick::PriceTick;
use crate::types::timestamp::Timestamp;
use crate::utils::task_supervisor::TaskSupervisor;

/// Builder for the running relay. Collaborators left unset fall back to
/// the configured defaults.
pub struct PriceRelay {
    config: AppConfig,
    catalog: Option<Arc<dyn SymbolCatalog>>,
    previous_close: Option<Arc<dyn PreviousCloseLookup>>,
    fetcher: Option<Arc<dyn QuoteFetcher>>,
}

impl PriceRelay {
    pub fn new(config: AppConfig) -> Self {
        PriceRelay {
            config,
            catalog: None,
            previous_close: None,
            fetcher: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn SymbolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_previous_close(mut self, lookup: Arc<dyn PreviousCloseLookup>) -> Self {
        self.previous_close = Some(lookup);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn QuoteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Spawns every worker and returns once they are running. The initial
    /// symbol set is loaded before the feeds start; if the catalog fails it
    /// is retried on the refresh interval.
    pub async fn start(self) -> Result<RelayHandle> {
        let config = self.config;
        config.validate()?;

        let catalog: Arc<dyn SymbolCatalog> = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(StaticSymbolCatalog::new(&config.symbols.tracked)),
        };
        let fetcher: Arc<dyn QuoteFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpQuoteFetcher::new(&config.polling)?),
        };
        let enricher = self
            .previous_close
            .map(TickEnricher::new)
            .unwrap_or_else(TickEnricher::disabled);

        let mut supervisor = TaskSupervisor::new(CancellationToken::new());

        let (watcher, symbols) = SymbolWatcher::new(catalog, &config.symbols);
        if let Err(e) = watcher.refresh().await {
            warn!(error = %e, "Initial symbol load failed, feeds start with an empty set");
        }

        let (events_tx, events_rx) = mpsc::channel(config.runtime.event_channel_capacity);
        let distributor = BroadcastDistributor::new(config.distribution.subscriber_buffer, supervisor.token());

        let now = Timestamp::now();
        let mut core = FailoverCore::new(
            config.health.clone(),
            config.validation.clone(),
            config.failover.clone(),
            now,
        );
        let publisher = Arc::new(SnapshotPublisher::new(core.published_state(distributor.stats(), now)));
        let reconnect = ReconnectSignal::new();

        let streaming = StreamingIngestionClient::new(
            config.streaming.clone(),
            JsonStreamProtocol,
            events_tx.clone(),
            symbols.clone(),
            enricher.clone(),
            reconnect.clone(),
        );
        let polling = PollingFallbackSource::new(
            config.polling.clone(),
            fetcher,
            events_tx,
            symbols,
            enricher,
        );
        let (router, control) = RouterWorker::new(
            core,
            events_rx,
            distributor.clone(),
            publisher.clone(),
            reconnect,
            config.failover.evaluation_interval(),
            config.runtime.control_channel_capacity,
        );

        let router_token = supervisor.token();
        let streaming_token = supervisor.token();
        let polling_token = supervisor.token();
        let watcher_token = supervisor.token();
        supervisor
            .spawn("router", router.run(router_token))
            .spawn("primary-stream", streaming.run(streaming_token))
            .spawn("secondary-poll", polling.run(polling_token))
            .spawn("symbol-watcher", watcher.run(watcher_token));

        info!(
            primary = %config.streaming.url,
            secondary = %config.polling.url,
            "Price relay started"
        );

        Ok(RelayHandle {
            distributor,
            publisher,
            control,
            supervisor: Mutex::new(supervisor),
            shutdown_grace: config.runtime.shutdown_grace(),
        })
    }
}

/// Consumer-facing handle on a running relay. Share it behind an `Arc`.
pub struct RelayHandle {
    distributor: BroadcastDistributor,
    publisher: Arc<SnapshotPublisher>,
    control: RouterControl,
    supervisor: Mutex<TaskSupervisor>,
    shutdown_grace: Duration,
}

impl RelayHandle {
    /// Stream of routed ticks. Ends when the relay shuts down.
    pub fn subscribe(&self) -> TickStream {
        self.distributor.subscribe()
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.publisher.health()
    }

    pub fn phase(&self) -> RouterPhase {
        self.publisher.load().health.phase
    }

    pub fn last_tick(&self, symbol: &Symbol) -> Option<PriceTick> {
        self.publisher.last_tick(symbol)
    }

    pub async fn force_failover(&self) -> Result<RouterPhase> {
        self.control.force_failover().await
    }

    pub async fn force_reconnect_primary(&self) -> Result<RouterPhase> {
        self.control.force_reconnect_primary().await
    }

    /// Errors when a worker has ended on its own.
    pub async fn check_health(&self) -> Result<()> {
        self.supervisor.lock().await.check_health()
    }

    /// Stops all workers and ends every subscriber stream. Idempotent.
    pub async fn shutdown(&self) {
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.is_shutting_down() && supervisor.active_task_count() == 0 {
            return;
        }
        supervisor.shutdown(self.shutdown_grace).await;
        info!("Price relay stopped");
    }
}

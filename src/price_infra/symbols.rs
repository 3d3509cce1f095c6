use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use crate::config::SymbolsConfig;
use crate::error::Result;
use crate::interfaces::symbol_catalog::SymbolCatalog;
use crate::types::symbol::Symbol;

/// Keeps the tracked symbol set current and hands it to the ingestion
/// workers through a `watch` channel.
pub struct SymbolWatcher {
    catalog: Arc<dyn SymbolCatalog>,
    venue: String,
    refresh_interval: Duration,
    tx: watch::Sender<Vec<Symbol>>,
}

impl SymbolWatcher {
    pub fn new(catalog: Arc<dyn SymbolCatalog>, config: &SymbolsConfig) -> (Self, watch::Receiver<Vec<Symbol>>) {
        let (tx, rx) = watch::channel(Vec::new());
        let watcher = SymbolWatcher {
            catalog,
            venue: config.venue.clone(),
            refresh_interval: config.refresh_interval(),
            tx,
        };
        (watcher, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Symbol>> {
        self.tx.subscribe()
    }

    /// Queries the catalog once. Returns whether the set changed. On error
    /// the previous set stays in place.
    pub async fn refresh(&self) -> Result<bool> {
        let symbols = self.catalog.tracked_symbols(&self.venue).await?;
        let changed = self.tx.send_if_modified(|current| {
            if *current == symbols {
                return false;
            }
            *current = symbols;
            true
        });
        if changed {
            let current = self.tx.borrow();
            info!(venue = %self.venue, count = current.len(), "Tracked symbol set updated");
        }
        Ok(changed)
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Symbol watcher stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(venue = %self.venue, error = %e, "Symbol refresh failed, keeping previous set");
                    }
                }
            }
        }
    }
}

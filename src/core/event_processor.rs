use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use crate::core::router::FailoverCore;
use crate::core::state_machine::RouterPhase;
use crate::distribution::broadcast::BroadcastDistributor;
use crate::distribution::snapshot::SnapshotPublisher;
use crate::error::{Error, Result};
use crate::events::feed::FeedEvent;
use crate::observability::metrics::EVENT_PROCESSING_LATENCY;
use crate::price_infra::connectors::ReconnectSignal;
use crate::types::tick::PriceTick;
use crate::types::timestamp::Timestamp;

/// Administrative requests, answered with the phase after handling.
#[derive(Debug)]
pub enum ControlCommand {
    ForceFailover { reply: oneshot::Sender<RouterPhase> },
    ForceReconnectPrimary { reply: oneshot::Sender<RouterPhase> },
}

/// Cloneable handle for issuing control commands to the router worker.
#[derive(Clone)]
pub struct RouterControl {
    tx: mpsc::Sender<ControlCommand>,
}

impl RouterControl {
    pub async fn force_failover(&self) -> Result<RouterPhase> {
        self.request(|reply| ControlCommand::ForceFailover { reply }).await
    }

    pub async fn force_reconnect_primary(&self) -> Result<RouterPhase> {
        self.request(|reply| ControlCommand::ForceReconnectPrimary { reply }).await
    }

    async fn request(&self, command: impl FnOnce(oneshot::Sender<RouterPhase>) -> ControlCommand) -> Result<RouterPhase> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(command(reply)).await.map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)
    }
}

/// The single writer of routing state.
///
/// Owns the `FailoverCore` and processes feed events, control commands and
/// periodic evaluations strictly one at a time. After each step the
/// resulting state is swapped into the `SnapshotPublisher`.
pub struct RouterWorker {
    core: FailoverCore,
    events: mpsc::Receiver<FeedEvent>,
    control: mpsc::Receiver<ControlCommand>,
    distributor: BroadcastDistributor,
    publisher: Arc<SnapshotPublisher>,
    reconnect: ReconnectSignal,
    evaluation_interval: Duration,
}

impl RouterWorker {
    pub fn new(
        core: FailoverCore,
        events: mpsc::Receiver<FeedEvent>,
        distributor: BroadcastDistributor,
        publisher: Arc<SnapshotPublisher>,
        reconnect: ReconnectSignal,
        evaluation_interval: Duration,
        control_capacity: usize,
    ) -> (Self, RouterControl) {
        let (tx, control) = mpsc::channel(control_capacity.max(1));
        let worker = RouterWorker {
            core,
            events,
            control,
            distributor,
            publisher,
            reconnect,
            evaluation_interval,
        };
        (worker, RouterControl { tx })
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.evaluation_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.publish_state(Timestamp::now());

        info!(phase = %self.core.phase(), "Router worker started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(command) = self.control.recv() => self.handle_control(command),
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("All feed workers gone, router worker stopping");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let now = Timestamp::now();
                    let out = self.core.on_timer(now);
                    self.dispatch(out);
                    self.publish_state(now);
                }
            }
        }

        self.publish_state(Timestamp::now());
        info!(phase = %self.core.phase(), "Router worker stopped");
    }

    fn handle_event(&mut self, event: FeedEvent) {
        let started = Instant::now();
        let now = Timestamp::now();
        debug!(kind = event.label(), source = %event.source(), "Feed event");

        let out = self.core.handle_event(event, now);
        self.dispatch(out);
        self.publish_state(now);

        EVENT_PROCESSING_LATENCY.observe(started.elapsed().as_secs_f64());
    }

    fn handle_control(&mut self, command: ControlCommand) {
        let now = Timestamp::now();
        let reply = match command {
            ControlCommand::ForceFailover { reply } => {
                info!(phase = %self.core.phase(), "Manual failover requested");
                let out = self.core.force_failover(now);
                self.dispatch(out);
                reply
            }
            ControlCommand::ForceReconnectPrimary { reply } => {
                info!(phase = %self.core.phase(), "Primary reconnect requested");
                self.core.force_reconnect_primary();
                self.reconnect.request();
                let out = self.core.on_timer(now);
                self.dispatch(out);
                reply
            }
        };
        self.publish_state(now);
        // Caller may have given up waiting.
        let _ = reply.send(self.core.phase());
    }

    fn dispatch(&self, ticks: Vec<PriceTick>) {
        for tick in ticks {
            self.distributor.publish(tick);
        }
    }

    fn publish_state(&mut self, now: Timestamp) {
        let state = self.core.published_state(self.distributor.stats(), now);
        self.publisher.publish(state);
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, warn};
use crate::observability::metrics::{SUBSCRIBERS, TICKS_DROPPED};
use crate::types::ids::SubscriptionId;
use crate::types::tick::PriceTick;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionStats {
    pub published: u64,
    pub dropped: u64,
    pub subscribers: usize,
}

struct Counters {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Fan-out of routed ticks. Publishing never waits on subscribers; one that
/// falls more than the buffer behind loses its oldest ticks.
#[derive(Clone)]
pub struct BroadcastDistributor {
    tx: broadcast::Sender<PriceTick>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
}

impl BroadcastDistributor {
    pub fn new(buffer: usize, shutdown: CancellationToken) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        BroadcastDistributor {
            tx,
            counters: Arc::new(Counters {
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            shutdown,
        }
    }

    /// Returns the number of subscribers the tick was queued for.
    pub fn publish(&self, tick: PriceTick) -> usize {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        // No subscribers is not an error.
        self.tx.send(tick).unwrap_or(0)
    }

    pub fn subscribe(&self) -> TickStream {
        let id = SubscriptionId::new();
        SUBSCRIBERS.inc();
        debug!(subscription = %id, "Tick subscriber attached");
        TickStream {
            id,
            inner: BroadcastStream::new(self.tx.subscribe()),
            shutdown: Box::pin(self.shutdown.clone().cancelled_owned()),
            dropped: 0,
            counters: self.counters.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> DistributionStats {
        DistributionStats {
            published: self.published(),
            dropped: self.dropped(),
            subscribers: self.subscriber_count(),
        }
    }
}

/// A subscriber's view of the tick feed. Ends on relay shutdown; dropping
/// it detaches.
pub struct TickStream {
    id: SubscriptionId,
    inner: BroadcastStream<PriceTick>,
    shutdown: Pin<Box<WaitForCancellationFutureOwned>>,
    dropped: u64,
    counters: Arc<Counters>,
}

impl TickStream {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Ticks this subscriber lost by lagging.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Stream for TickStream {
    type Item = PriceTick;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<PriceTick>> {
        if self.shutdown.as_mut().poll(cx).is_ready() {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(tick))) => return Poll::Ready(Some(tick)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(missed)))) => {
                    self.dropped += missed;
                    self.counters.dropped.fetch_add(missed, Ordering::Relaxed);
                    TICKS_DROPPED.inc_by(missed);
                    warn!(subscription = %self.id, missed, "Slow subscriber lost ticks");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for TickStream {
    fn drop(&mut self) {
        SUBSCRIBERS.dec();
        debug!(subscription = %self.id, dropped = self.dropped, "Tick subscriber detached");
    }
}

use std::fmt;
use serde::{Deserialize, Serialize};
use crate::types::tick::{PriceTick, TickSource};
use crate::types::timestamp::Timestamp;

/// Messages the ingestion workers send to the router worker. Workers never
/// touch shared state directly; every observation travels as one of these.
#[derive(Clone, Debug)]
pub enum FeedEvent {
    TickReceived {
        tick: PriceTick,
        received_at: Timestamp,
    },
    HealthChanged {
        source: TickSource,
        status: ConnectionStatus,
        at: Timestamp,
    },
    SourceFailure {
        source: TickSource,
        reason: FailureReason,
        at: Timestamp,
    },
}

impl FeedEvent {
    pub fn tick(tick: PriceTick, received_at: Timestamp) -> Self {
        FeedEvent::TickReceived { tick, received_at }
    }

    pub fn failure(source: TickSource, reason: FailureReason) -> Self {
        FeedEvent::SourceFailure { source, reason, at: Timestamp::now() }
    }

    pub fn health(source: TickSource, status: ConnectionStatus) -> Self {
        FeedEvent::HealthChanged { source, status, at: Timestamp::now() }
    }

    pub fn source(&self) -> TickSource {
        match self {
            FeedEvent::TickReceived { tick, .. } => tick.source(),
            FeedEvent::HealthChanged { source, .. } => *source,
            FeedEvent::SourceFailure { source, .. } => *source,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeedEvent::TickReceived { .. } => "tick",
            FeedEvent::HealthChanged { .. } => "health",
            FeedEvent::SourceFailure { .. } => "failure",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected { reason: String },
    AuthFailed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    ConnectFailed(String),
    AuthFailed(String),
    Disconnected(String),
    Silence { silent_ms: u64 },
    ParseError(String),
    FetchFailed(String),
    InvalidData(String),
    RepeatedCircuitTrips(u32),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            FailureReason::AuthFailed(e) => write!(f, "authentication failed: {}", e),
            FailureReason::Disconnected(e) => write!(f, "disconnected: {}", e),
            FailureReason::Silence { silent_ms } => write!(f, "silent for {}ms", silent_ms),
            FailureReason::ParseError(e) => write!(f, "parse error: {}", e),
            FailureReason::FetchFailed(e) => write!(f, "fetch failed: {}", e),
            FailureReason::InvalidData(e) => write!(f, "invalid data: {}", e),
            FailureReason::RepeatedCircuitTrips(n) => write!(f, "{} consecutive circuit breaker trips", n),
        }
    }
}

use serde::{Deserialize, Serialize};
use crate::core::state_machine::RouterPhase;
use crate::types::ids::TransitionId;
use crate::types::timestamp::Timestamp;

/// Observability record emitted on every phase change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTransition {
    pub id: TransitionId,
    pub from: RouterPhase,
    pub to: RouterPhase,
    pub reason: String,
    pub at: Timestamp,
    /// How long the router stayed in `from`, in milliseconds.
    pub from_duration_ms: u64,
    pub fallback_activation_count: u64,
    pub manual: bool,
}

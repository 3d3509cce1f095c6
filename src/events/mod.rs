pub mod feed;
pub mod transition;

pub use feed::{ConnectionStatus, FailureReason, FeedEvent};
pub use transition::PhaseTransition;

pub mod event_processor;
pub mod router;
pub mod state_machine;

pub use event_processor::{ControlCommand, RouterControl, RouterWorker};
pub use router::FailoverCore;
pub use state_machine::{FailoverStateMachine, RouterPhase, RouterState};

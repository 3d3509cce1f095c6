pub mod broadcast;
pub mod snapshot;

pub use broadcast::{BroadcastDistributor, DistributionStats, TickStream};
pub use snapshot::{HealthSnapshot, PublishedState, SnapshotPublisher, SourceHealthPair};

pub mod ids;
pub mod price;
pub mod symbol;
pub mod tick;
pub mod timestamp;
pub mod volume;

pub use price::Price;
pub use symbol::Symbol;
pub use tick::{PriceTick, TickSource};
pub use timestamp::Timestamp;
pub use volume::Volume;

pub mod types;
pub mod error;
pub mod config;
pub mod events;
pub mod health;
pub mod core;
pub mod price_infra;
pub mod distribution;
pub mod interfaces;
pub mod observability;
pub mod utils;
pub mod relay;
pub mod api;

pub use error::{Error, Result};
pub use relay::{PriceRelay, RelayHandle};

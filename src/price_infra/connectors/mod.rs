//! Upstream connectivity. Vendor wire formats live behind `StreamProtocol`
//! (push feed) and `QuoteFetcher` (pull feed) so the workers stay generic.

pub mod polling;
pub mod protocol;
pub mod streaming;

use async_trait::async_trait;
use crate::error::Result;
use crate::price_infra::RawQuote;
use crate::types::symbol::Symbol;

pub use polling::{HttpQuoteFetcher, PollingFallbackSource};
pub use protocol::JsonStreamProtocol;
pub use streaming::{ReconnectSignal, StreamingIngestionClient};

/// A decoded inbound push-feed message.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    AuthOk,
    AuthRejected(String),
    Quote(RawQuote),
    Heartbeat,
    /// Unknown or irrelevant message type; ignored.
    Other,
}

/// Push feed message format.
pub trait StreamProtocol: Send + Sync {
    fn auth_frame(&self, api_key: &str) -> String;
    fn subscribe_frame(&self, symbols: &[Symbol]) -> String;
    fn unsubscribe_frame(&self, symbols: &[Symbol]) -> String;
    /// Malformed payloads are errors; unknown message types are `Frame::Other`.
    fn parse(&self, raw: &str) -> Result<Frame>;
}

/// Pull feed: one request for the current quotes of a symbol set.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<RawQuote>>;
}

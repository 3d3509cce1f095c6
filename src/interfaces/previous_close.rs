use async_trait::async_trait;
use chrono::NaiveDate;
use crate::error::Result;
use crate::types::price::Price;
use crate::types::symbol::Symbol;

/// Closing price of the session before `as_of`, when known.
#[async_trait]
pub trait PreviousCloseLookup: Send + Sync {
    async fn previous_close(&self, symbol: &Symbol, as_of: NaiveDate) -> Result<Option<Price>>;
}

use async_trait::async_trait;
use crate::error::Result;
use crate::types::symbol::{normalize_symbols, Symbol};

/// Source of the instruments the relay should track on a venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SymbolCatalog: Send + Sync {
    /// Ordered, de-duplicated list of symbols.
    async fn tracked_symbols(&self, venue: &str) -> Result<Vec<Symbol>>;
}

/// Catalog backed by the configured symbol list.
pub struct StaticSymbolCatalog {
    symbols: Vec<Symbol>,
}

impl StaticSymbolCatalog {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        StaticSymbolCatalog {
            symbols: normalize_symbols(symbols),
        }
    }
}

#[async_trait]
impl SymbolCatalog for StaticSymbolCatalog {
    async fn tracked_symbols(&self, _venue: &str) -> Result<Vec<Symbol>> {
        Ok(self.symbols.clone())
    }
}

pub mod previous_close;
pub mod symbol_catalog;

pub use previous_close::PreviousCloseLookup;
pub use symbol_catalog::{StaticSymbolCatalog, SymbolCatalog};

//! Record catalog - the read-only input set of bibliographic records.
//!
//! Records come from a Semantic Scholar style export (`{"papers": [...]}`).
//! The pipeline never writes back to the catalog.

mod loader;
mod types;

pub use loader::{load_records, parse_records};
pub use types::*;

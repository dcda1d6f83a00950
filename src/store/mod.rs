//! In-memory ingestion store
//!
//! # Submodules
//! - `strings` - Tag string dictionary with optional file mirror
//! - `spatial` - Stored record and R-tree entry types
//! - `quadkey_store` - Per-LOD partitioned store with range and tile insertion

mod quadkey_store;
mod spatial;
mod strings;

pub use quadkey_store::{InsertOutcome, QuadKeyStore};
pub use spatial::{IndexedRecord, StoredRecord, SYNTHETIC_ID_FLAG};
pub use strings::{StringTable, STRING_DATA_FILE, STRING_INDEX_FILE};

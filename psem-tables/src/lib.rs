//! Table cache for the PSEM protocol
//!
//! Tables are numbered byte blobs owned exclusively by the cache for the
//! life of one logical session. Reads are lazy and dependency-aware: a
//! table's effective length may be a function of other tables' cached
//! fields, large tables are transferred in offset chunks, and append-only
//! logs are re-validated against their status counters after a chunked
//! transfer.

pub mod cache;
pub mod reader;
pub mod registry;

pub use cache::TableCache;
pub use registry::{
    ax_catalog, catalog_for_device_class, standard_catalog, LengthRule, LogCounters, LogSpec,
    TableCatalog, TableSpec,
};

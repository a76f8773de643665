//! ponder-db — namespace locking, live/cache table provisioning, and
//! build-ID content hashing.

pub mod buildid;
pub mod lock;
pub mod service;

pub use buildid::{cache_table_name, compute_build_id, physical_table_name};
pub use lock::{Acquisition, NamespaceLock};
pub use service::{CachePolicy, DatabaseService, SetupOutcome};

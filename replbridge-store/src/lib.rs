//! The Target-Store Access Layer: one pooled MySQL connection set per
//! physical tenant database, a parameterised execute/transaction API,
//! schema introspection and materialisation, and the CSV bootstrap
//! bulk-load pipeline.

pub mod bulk_load;
pub mod error;
pub mod pool;
pub mod target_store;

pub use bulk_load::{BulkLoadOptions, BulkLoadOutcome};
pub use error::StoreError;
pub use pool::{PoolManager, PoolManagerConfig};
pub use target_store::{ExecuteOutcome, MySqlTargetStore, TargetStore};

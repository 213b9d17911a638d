pub mod io;
pub mod buggify;
pub mod observability;
pub mod sync;

pub use sync::{LedgerStore, CheckpointStore, SyncConfig, SyncDriver, SyncError};

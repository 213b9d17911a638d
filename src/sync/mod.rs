//! Ledger Synchronization
//!
//! Turns a live event stream into rows of a shared, human-edited ledger
//! without writing duplicates, across restarts and remote failures.
//!
//! ## Architecture
//!
//! ```text
//! stdin → LineSource → parse_line → PendingQueues
//!                                        ↓
//!                           Reconciler (window read, dedup)
//!                                        ↓
//!                     append_rows → persist checkpoint → update_cell
//! ```
//!
//! ## Key Features
//!
//! - **Window dedup**: only a band of rows around the checkpoint is read
//! - **Durable checkpoint**: persisted after every successful append
//! - **Bounded retry**: fixed backoff, fatal after a run of failures
//! - **Deterministic simulation**: seeded faults, crashes and human edits

pub mod address;
pub mod row;
pub mod event;
pub mod queue;
pub mod ledger_store;
pub mod checkpoint;
pub mod config;
pub mod reconciler;
pub mod driver;
pub mod source;
pub mod simulated_store;
pub mod dst;
#[cfg(feature = "sheets")]
pub mod sheets_store;

pub use address::{AddressError, CellRange, CellRef};
pub use row::{Row, AmountError, normalize_timestamp, normalize_whitespace, parse_amount};
pub use event::{parse_line, Boundary, LineEvent, Milestone, ParseWarning};
pub use queue::{AnnotationRequest, AnnotationTarget, PendingQueues};
pub use ledger_store::{InMemoryLedger, LedgerError, LedgerFuture, LedgerStore, TsvFileLedger};
pub use checkpoint::{
    CheckpointError, CheckpointFuture, CheckpointStore, FileCheckpointStore,
    MemoryCheckpointStore,
};
pub use config::{ConfigError, LedgerBackend, LedgerConfig, ReconcileConfig, RetryConfig, SyncConfig};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use driver::{DriverState, DriverStats, PassReport, SyncDriver, SyncError};
pub use source::spawn_line_reader;
pub use simulated_store::{
    SimulatedCheckpointStore, SimulatedLedger, SimulatedLedgerConfig, SimulatedLedgerStats,
};
pub use dst::{SyncDSTConfig, SyncDSTHarness, SyncDSTResult, run_dst_batch, summarize_batch};
#[cfg(feature = "sheets")]
pub use sheets_store::SheetsLedger;

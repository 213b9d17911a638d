//! Sync Driver
//!
//! Single control loop that moves parsed lines into the ledger.
//!
//! ## States
//!
//! ```text
//!            line                 input quiet          ok
//!   Idle ───────────► Draining ───────────► Reconciling ───► Flushing ──┐
//!    ▲                                          │ read err        │     │
//!    │                                          ▼                 │ err │ ok
//!    └───────────── sleep(backoff) ◄──────── Backoff ◄────────────┘     │
//!    └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The durable checkpoint only moves after rows are written. On any failure
//! the working checkpoint falls back to it and the queues are kept, so the
//! next pass reconciles again and rows that did land are deduplicated away.

use crate::sync::address::CellRef;
use crate::sync::checkpoint::{resolve_start, CheckpointError, CheckpointStore};
use crate::sync::config::SyncConfig;
use crate::sync::event::{parse_line, LineEvent};
use crate::sync::ledger_store::{LedgerError, LedgerStore};
use crate::sync::queue::PendingQueues;
use crate::sync::reconciler::Reconciler;
use crate::sync::row::COMMENT_COLUMN;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

/// Driver state, traced on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Waiting for input
    Idle,
    /// Pulling every line that is immediately available
    Draining,
    /// Scanning the ledger window
    Reconciling,
    /// Writing rows, checkpoint, then annotations
    Flushing,
    /// A pass failed; waiting before the next one
    Backoff,
}

/// Error type for sync operations
#[derive(Debug)]
pub enum SyncError {
    /// Reading the reconcile window failed
    RemoteRead(LedgerError),
    /// Appending rows failed
    RemoteWrite(LedgerError),
    /// Rows were written but the checkpoint could not be saved
    CheckpointPersist(CheckpointError),
    /// Too many consecutive failed passes
    FailureBudgetExhausted { failures: u32, last: Box<SyncError> },
    /// Ledger or checkpoint could not be opened
    StoreOpen(String),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::RemoteRead(e) => write!(f, "Remote read failed: {}", e),
            SyncError::RemoteWrite(e) => write!(f, "Remote write failed: {}", e),
            SyncError::CheckpointPersist(e) => write!(f, "Checkpoint persist failed: {}", e),
            SyncError::FailureBudgetExhausted { failures, last } => write!(
                f,
                "Giving up after {} consecutive failures, last: {}",
                failures, last
            ),
            SyncError::StoreOpen(msg) => write!(f, "Failed to open store: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::RemoteRead(e) | SyncError::RemoteWrite(e) => Some(e),
            SyncError::CheckpointPersist(e) => Some(e),
            SyncError::FailureBudgetExhausted { last, .. } => Some(last.as_ref()),
            SyncError::StoreOpen(_) => None,
        }
    }
}

/// Counters over the driver's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub lines_ingested: u64,
    pub parse_warnings: u64,
    pub passes: u64,
    pub failed_passes: u64,
    pub rows_appended: u64,
    pub duplicates_dropped: u64,
    pub annotations_applied: u64,
    pub annotations_failed: u64,
    pub low_value_rows: u64,
}

/// What one successful pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Row the batch was written at
    pub insertion_row: u64,
    pub rows_appended: usize,
    pub duplicates_dropped: usize,
    pub annotations_applied: usize,
    pub annotations_failed: usize,
    /// Checkpoint after the pass
    pub checkpoint: u64,
}

/// Owns the queues and checkpoint, drives passes against the ledger
pub struct SyncDriver<S: LedgerStore, C: CheckpointStore> {
    store: S,
    checkpoints: C,
    config: SyncConfig,
    queues: PendingQueues,
    /// Working insertion point
    checkpoint: u64,
    /// Last value known to be persisted (or the seed on first run)
    durable_checkpoint: u64,
    search_radius: u64,
    consecutive_failures: u32,
    state: DriverState,
    stats: DriverStats,
}

impl<S: LedgerStore, C: CheckpointStore> SyncDriver<S, C> {
    /// Load the checkpoint and build a driver ready to ingest
    pub async fn open(
        store: S,
        checkpoints: C,
        config: SyncConfig,
        starting_row_override: Option<u64>,
    ) -> Result<Self, SyncError> {
        let stored = checkpoints
            .load()
            .await
            .map_err(|e| SyncError::StoreOpen(format!("checkpoint: {}", e)))?;
        let checkpoint = resolve_start(starting_row_override, stored, config.starting_row);
        info!(checkpoint, stored = ?stored, "Sync driver opened");

        Ok(SyncDriver {
            store,
            checkpoints,
            search_radius: config.reconcile.initial_search_radius,
            config,
            queues: PendingQueues::new(),
            checkpoint,
            durable_checkpoint: checkpoint,
            consecutive_failures: 0,
            state: DriverState::Idle,
            stats: DriverStats::default(),
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    pub fn durable_checkpoint(&self) -> u64 {
        self.durable_checkpoint
    }

    pub fn search_radius(&self) -> u64 {
        self.search_radius
    }

    pub fn pending(&self) -> &PendingQueues {
        &self.queues
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Parse one line into the queues; unrecognized lines are logged and dropped
    pub fn ingest_line(&mut self, line: &str) {
        self.stats.lines_ingested += 1;
        let event = parse_line(line);
        match &event {
            LineEvent::StreamBoundary { boundary, row } => {
                info!(boundary = ?boundary, timestamp = row.timestamp(), "Stream boundary")
            }
            LineEvent::Milestone(milestone) => info!(level = milestone.level, "Hype train ended"),
            _ => {}
        }
        if let Err(warning) = self.queues.apply(event) {
            self.stats.parse_warnings += 1;
            warn!("{}", warning);
        }
    }

    /// Reconcile and flush whatever is queued.
    ///
    /// On error the working checkpoint is rolled back and the queues kept;
    /// the caller decides whether to back off.
    pub async fn sync_pass(&mut self) -> Result<PassReport, SyncError> {
        if self.queues.is_empty() {
            return Ok(PassReport {
                insertion_row: self.checkpoint,
                checkpoint: self.checkpoint,
                ..PassReport::default()
            });
        }
        self.stats.passes += 1;

        self.transition(DriverState::Reconciling);
        let result = Reconciler::new(&self.store, &self.config.reconcile)
            .reconcile(&mut self.queues, self.checkpoint, self.search_radius)
            .await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Reconcile failed");
                return Err(self.rollback(SyncError::RemoteRead(e)));
            }
        };
        self.checkpoint = outcome.checkpoint;
        self.search_radius = outcome.search_radius;
        self.stats.duplicates_dropped += outcome.duplicates_dropped as u64;
        if outcome.low_value_row.is_some() {
            self.stats.low_value_rows += 1;
        }

        self.transition(DriverState::Flushing);
        let insertion_row = self.checkpoint;
        let rows_appended = self.queues.rows().len();
        if rows_appended > 0 {
            let appended = self
                .store
                .append_rows(insertion_row, self.queues.rows())
                .await;
            if let Err(e) = appended {
                error!(error = %e, "Append failed");
                return Err(self.rollback(SyncError::RemoteWrite(e)));
            }
            self.checkpoint = insertion_row + rows_appended as u64;

            let persisted = self.checkpoints.persist(self.checkpoint).await;
            if let Err(e) = persisted {
                error!(error = %e, checkpoint = self.checkpoint, "Checkpoint persist failed");
                return Err(self.rollback(SyncError::CheckpointPersist(e)));
            }
            self.durable_checkpoint = self.checkpoint;
            self.stats.rows_appended += rows_appended as u64;
            info!(
                insertion_row,
                rows = rows_appended,
                checkpoint = self.checkpoint,
                "Flushed rows"
            );
        }

        let (annotations_applied, annotations_failed) = self.flush_annotations(insertion_row).await;

        self.queues.clear();
        self.consecutive_failures = 0;
        self.transition(DriverState::Idle);

        Ok(PassReport {
            insertion_row,
            rows_appended,
            duplicates_dropped: outcome.duplicates_dropped,
            annotations_applied,
            annotations_failed,
            checkpoint: self.checkpoint,
        })
    }

    /// Best-effort: each failure is logged and the annotation dropped
    async fn flush_annotations(&mut self, insertion_row: u64) -> (usize, usize) {
        let mut applied = 0;
        let mut failed = 0;
        for annotation in self.queues.take_annotations() {
            let Some(row) = annotation.target_row(insertion_row) else {
                warn!(
                    target = ?annotation.target,
                    value = %annotation.value,
                    "AnnotationFailure: target above the first row"
                );
                failed += 1;
                continue;
            };
            let cell = CellRef::new(COMMENT_COLUMN, row);
            match self.store.update_cell(&cell, &annotation.value).await {
                Ok(()) => {
                    debug!(cell = %cell, value = %annotation.value, "Annotated");
                    applied += 1;
                }
                Err(e) => {
                    warn!(cell = %cell, error = %e, "AnnotationFailure");
                    failed += 1;
                }
            }
        }
        self.stats.annotations_applied += applied as u64;
        self.stats.annotations_failed += failed as u64;
        (applied, failed)
    }

    /// Run until the line channel closes, then flush what is left
    pub async fn run(
        &mut self,
        mut lines: mpsc::UnboundedReceiver<String>,
    ) -> Result<DriverStats, SyncError> {
        let poll_interval = self.config.retry.poll_interval;
        loop {
            self.transition(DriverState::Idle);
            let mut closed = false;

            match tokio::time::timeout(poll_interval, lines.recv()).await {
                Ok(Some(line)) => {
                    self.transition(DriverState::Draining);
                    self.ingest_line(&line);
                    loop {
                        match lines.try_recv() {
                            Ok(line) => self.ingest_line(&line),
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => {
                                closed = true;
                                break;
                            }
                        }
                    }
                }
                Ok(None) => closed = true,
                Err(_) => {}
            }

            if closed {
                info!("Input closed, flushing remaining entries");
                while !self.queues.is_empty() {
                    self.cycle().await?;
                }
                info!(stats = ?self.stats, "Sync driver finished");
                return Ok(self.stats.clone());
            }

            if !self.queues.is_empty() {
                self.cycle().await?;
            }
        }
    }

    async fn cycle(&mut self) -> Result<(), SyncError> {
        match self.sync_pass().await {
            Ok(_) => Ok(()),
            Err(e) => self.enter_backoff(e).await,
        }
    }

    async fn enter_backoff(&mut self, err: SyncError) -> Result<(), SyncError> {
        self.transition(DriverState::Backoff);
        self.consecutive_failures += 1;
        self.stats.failed_passes += 1;

        let budget = self.config.retry.max_consecutive_failures;
        if self.consecutive_failures >= budget {
            error!(failures = self.consecutive_failures, error = %err, "Failure budget exhausted");
            return Err(SyncError::FailureBudgetExhausted {
                failures: self.consecutive_failures,
                last: Box::new(err),
            });
        }

        let delay = self.config.retry.backoff_delay;
        warn!(
            failures = self.consecutive_failures,
            budget,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Pass failed, backing off"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }

    fn rollback(&mut self, err: SyncError) -> SyncError {
        debug!(
            from = self.checkpoint,
            to = self.durable_checkpoint,
            "Rolling back checkpoint"
        );
        self.checkpoint = self.durable_checkpoint;
        self.search_radius = self.config.reconcile.initial_search_radius;
        err
    }

    fn transition(&mut self, next: DriverState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Driver state");
            self.state = next;
        }
    }
}

//! Reconciler
//!
//! Finds where pending rows belong in the ledger and drops the ones that are
//! already there.
//!
//! ## Window scan
//!
//! ```text
//!   start = max(1, checkpoint - radius)
//!   end   = checkpoint + radius
//!
//!   row p non-blank  => checkpoint = max(checkpoint, p + 1), dedup against p
//!   checkpoint <= end => done, checkpoint is the first free row
//!   otherwise         => start = checkpoint - margin, radius *= 2, rescan
//! ```
//!
//! The checkpoint strictly increases across rescans, so the loop ends as soon
//! as the ledger has a blank row after its last entry.

use crate::sync::address::CellRange;
use crate::sync::config::ReconcileConfig;
use crate::sync::ledger_store::{is_blank, LedgerError, LedgerStore};
use crate::sync::queue::PendingQueues;
use crate::sync::row::{
    normalize_timestamp, normalize_whitespace, parse_amount, Row, COMPARED_COLUMNS,
};
use tracing::{debug, info, warn};

/// Cells 2..=5 must match for a non-marker row to count as a duplicate
const DEDUP_CELLS: [usize; 4] = [2, 3, 4, 5];

/// Result of one reconcile pass
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// First free row; where the surviving rows will be written
    pub checkpoint: u64,
    /// Radius for the next pass
    pub search_radius: u64,
    /// Last surviving row with an amount below the threshold
    pub low_value_row: Option<u64>,
    pub duplicates_dropped: usize,
    pub windows_scanned: u32,
}

/// Reconciles pending rows against a ledger
pub struct Reconciler<'a, S: LedgerStore> {
    store: &'a S,
    config: &'a ReconcileConfig,
}

impl<'a, S: LedgerStore> Reconciler<'a, S> {
    pub fn new(store: &'a S, config: &'a ReconcileConfig) -> Self {
        Reconciler { store, config }
    }

    /// Scan around `checkpoint`, dedup `queues`, and locate the insertion row
    pub async fn reconcile(
        &self,
        queues: &mut PendingQueues,
        checkpoint: u64,
        search_radius: u64,
    ) -> Result<ReconcileOutcome, LedgerError> {
        let pending = queues.rows().len() as u64;
        let mut radius = search_radius.max(1);
        if pending > radius {
            radius = pending * 4;
        }

        let mut checkpoint = checkpoint.max(1);
        let mut start = checkpoint.saturating_sub(radius).max(1);
        let mut duplicates_dropped = 0;
        let mut windows_scanned = 0;

        loop {
            let end = checkpoint + radius;
            let range = CellRange::rows(start, end, 1, COMPARED_COLUMNS as u32);
            debug!(range = %range, "Scanning ledger window");
            let window = self.store.read_range(&range).await?;
            windows_scanned += 1;

            for (row_number, raw) in (start..=end).zip(pad_window(window, range.height())) {
                let cells: Vec<String> = raw.iter().map(|c| normalize_whitespace(c)).collect();
                if is_blank(&cells) {
                    continue;
                }
                checkpoint = checkpoint.max(row_number + 1);
                if queues.rows().is_empty() {
                    continue;
                }
                if let Some(timestamp) = normalize_timestamp(&cells[0]) {
                    duplicates_dropped += drop_duplicates(queues, &timestamp, &cells, row_number);
                }
            }

            if checkpoint <= end {
                break;
            }
            start = checkpoint.saturating_sub(self.config.extension_margin).max(1);
            radius *= 2;
            debug!(checkpoint, radius, "Window full, extending");
        }

        let low_value_row = self.flag_low_values(queues.rows(), checkpoint);

        info!(
            checkpoint,
            pending = queues.rows().len(),
            duplicates_dropped,
            windows_scanned,
            "Reconciled"
        );

        Ok(ReconcileOutcome {
            checkpoint,
            search_radius: self.config.steady_search_radius.min(radius),
            low_value_row,
            duplicates_dropped,
            windows_scanned,
        })
    }

    fn flag_low_values(&self, rows: &[Row], checkpoint: u64) -> Option<u64> {
        let mut low_value_row = None;
        for (offset, row) in rows.iter().enumerate() {
            match parse_amount(row.amount()) {
                Ok(Some(amount)) if amount < self.config.low_value_threshold => {
                    let target = checkpoint + offset as u64;
                    info!(row = target, amount, "Low value entry");
                    low_value_row = Some(target);
                }
                Ok(_) => {}
                Err(e) => warn!(timestamp = row.timestamp(), "{}", e),
            }
        }
        low_value_row
    }
}

/// Reads omit trailing rows; treat anything missing as blank
fn pad_window(mut window: Vec<Vec<String>>, height: u64) -> Vec<Vec<String>> {
    window.resize_with(height as usize, Vec::new);
    for cells in &mut window {
        cells.resize(COMPARED_COLUMNS, String::new());
    }
    window
}

fn drop_duplicates(
    queues: &mut PendingQueues,
    timestamp: &str,
    remote: &[String],
    row_number: u64,
) -> usize {
    let mut dropped = 0;
    let mut index = 0;
    while index < queues.rows().len() {
        let candidate = &queues.rows()[index];
        if candidate.timestamp() == timestamp && matches_remote(candidate, remote) {
            let row = queues.remove_row(index, row_number);
            debug!(row = row_number, entry = %row, "Dropping duplicate");
            dropped += 1;
        } else {
            index += 1;
        }
    }
    dropped
}

fn matches_remote(candidate: &Row, remote: &[String]) -> bool {
    candidate.is_stream_start()
        || DEDUP_CELLS
            .iter()
            .all(|&i| normalize_whitespace(&candidate.cells()[i]) == remote[i])
}

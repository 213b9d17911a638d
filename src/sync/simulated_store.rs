//! Simulated Ledger with Fault Injection
//!
//! DST-compatible wrappers that inject faults using buggify.
//! A seeded RNG makes every failure sequence reproducible.

use crate::buggify::faults::{checkpoint as checkpoint_faults, ledger as faults};
use crate::io::Rng;
use crate::sync::address::{CellRange, CellRef};
use crate::sync::checkpoint::{CheckpointError, CheckpointFuture, CheckpointStore};
use crate::sync::ledger_store::{append_range, LedgerError, LedgerFuture, LedgerStore};
use crate::sync::row::Row;
use parking_lot::Mutex;
use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedLedgerConfig {
    /// Probability of a range read failing
    pub read_fail_prob: f64,
    /// Probability of a range read returning fewer rows than asked
    pub read_short_prob: f64,
    /// Probability of an append failing before it reaches the ledger
    pub append_fail_prob: f64,
    /// Probability of an append landing but reporting failure
    pub append_lost_ack_prob: f64,
    /// Probability of a cell update failing
    pub update_fail_prob: f64,
    /// Probability of any request timing out
    pub timeout_prob: f64,
    /// Simulated latency range in microseconds (min, max)
    pub latency_range_us: (u64, u64),
}

impl Default for SimulatedLedgerConfig {
    fn default() -> Self {
        SimulatedLedgerConfig {
            read_fail_prob: 0.01,
            read_short_prob: 0.01,
            append_fail_prob: 0.01,
            append_lost_ack_prob: 0.005,
            update_fail_prob: 0.02,
            timeout_prob: 0.005,
            latency_range_us: (100, 10_000),
        }
    }
}

impl SimulatedLedgerConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedLedgerConfig {
            read_fail_prob: 0.05,
            read_short_prob: 0.05,
            append_fail_prob: 0.05,
            append_lost_ack_prob: 0.03,
            update_fail_prob: 0.05,
            timeout_prob: 0.02,
            latency_range_us: (1_000, 100_000),
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedLedgerConfig {
            read_fail_prob: 0.0,
            read_short_prob: 0.0,
            append_fail_prob: 0.0,
            append_lost_ack_prob: 0.0,
            update_fail_prob: 0.0,
            timeout_prob: 0.0,
            latency_range_us: (0, 0),
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedLedgerStats {
    pub read_attempts: u64,
    pub read_failures: u64,
    pub short_reads: u64,
    pub append_attempts: u64,
    pub append_failures: u64,
    pub lost_acks: u64,
    pub update_attempts: u64,
    pub update_failures: u64,
    pub timeouts: u64,
}

struct SimulatedLedgerInner<R: Rng> {
    rng: R,
    stats: SimulatedLedgerStats,
}

/// Simulated ledger that wraps another store and injects faults
pub struct SimulatedLedger<S: LedgerStore, R: Rng> {
    inner_store: S,
    config: SimulatedLedgerConfig,
    state: Arc<Mutex<SimulatedLedgerInner<R>>>,
}

impl<S: LedgerStore, R: Rng> SimulatedLedger<S, R> {
    pub fn new(inner_store: S, rng: R, config: SimulatedLedgerConfig) -> Self {
        SimulatedLedger {
            inner_store,
            config,
            state: Arc::new(Mutex::new(SimulatedLedgerInner {
                rng,
                stats: SimulatedLedgerStats::default(),
            })),
        }
    }

    pub fn stats(&self) -> SimulatedLedgerStats {
        self.state.lock().stats.clone()
    }

    pub fn reset_stats(&self) {
        self.state.lock().stats = SimulatedLedgerStats::default();
    }

    /// The wrapped store, bypassing fault injection
    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    fn roll(&self, fault_id: &str, probability: f64) -> bool {
        let mut s = self.state.lock();
        crate::buggify!(&mut s.rng, fault_id, probability)
    }

    fn timed_out(&self) -> bool {
        let hit = self.roll(faults::TIMEOUT, self.config.timeout_prob);
        if hit {
            self.state.lock().stats.timeouts += 1;
        }
        hit
    }

    async fn latency(&self) {
        let (min, max) = self.config.latency_range_us;
        if min == 0 && max == 0 {
            return;
        }
        let latency_us = {
            let mut s = self.state.lock();
            if max > min {
                s.rng.gen_range(min, max)
            } else {
                min
            }
        };
        if latency_us > 0 {
            tokio::time::sleep(std::time::Duration::from_micros(latency_us)).await;
        }
    }
}

impl<S: LedgerStore, R: Rng> LedgerStore for SimulatedLedger<S, R> {
    fn read_range<'a>(&'a self, range: &'a CellRange) -> LedgerFuture<'a, Vec<Vec<String>>> {
        Box::pin(async move {
            self.state.lock().stats.read_attempts += 1;

            if self.timed_out() {
                return Err(LedgerError::Read {
                    range: *range,
                    reason: "simulated timeout".into(),
                });
            }
            if self.roll(faults::READ_FAIL, self.config.read_fail_prob) {
                self.state.lock().stats.read_failures += 1;
                return Err(LedgerError::Read {
                    range: *range,
                    reason: "simulated read failure".into(),
                });
            }

            self.latency().await;
            let mut rows = self.inner_store.read_range(range).await?;

            // Sheets omits trailing empty rows; emulate that with a random cut
            if rows.len() > 1 && self.roll(faults::READ_SHORT, self.config.read_short_prob) {
                let keep = {
                    let mut s = self.state.lock();
                    s.stats.short_reads += 1;
                    s.rng.gen_range(1, rows.len() as u64) as usize
                };
                let cut_is_blank = rows[keep..]
                    .iter()
                    .all(|r| crate::sync::ledger_store::is_blank(r));
                if cut_is_blank {
                    rows.truncate(keep);
                }
            }

            Ok(rows)
        })
    }

    fn append_rows<'a>(&'a self, start_row: u64, rows: &'a [Row]) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().stats.append_attempts += 1;
            let range = append_range(start_row, rows.len());

            if self.timed_out() {
                return Err(LedgerError::Write {
                    range,
                    reason: "simulated timeout".into(),
                });
            }
            if self.roll(faults::APPEND_FAIL, self.config.append_fail_prob) {
                self.state.lock().stats.append_failures += 1;
                return Err(LedgerError::Write {
                    range,
                    reason: "simulated append failure".into(),
                });
            }

            self.latency().await;
            self.inner_store.append_rows(start_row, rows).await?;

            if self.roll(faults::APPEND_LOST_ACK, self.config.append_lost_ack_prob) {
                self.state.lock().stats.lost_acks += 1;
                return Err(LedgerError::Write {
                    range,
                    reason: "simulated lost acknowledgement".into(),
                });
            }
            Ok(())
        })
    }

    fn update_cell<'a>(&'a self, cell: &'a CellRef, value: &'a str) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().stats.update_attempts += 1;

            if self.timed_out() {
                return Err(LedgerError::Update {
                    cell: *cell,
                    reason: "simulated timeout".into(),
                });
            }
            if self.roll(faults::UPDATE_FAIL, self.config.update_fail_prob) {
                self.state.lock().stats.update_failures += 1;
                return Err(LedgerError::Update {
                    cell: *cell,
                    reason: "simulated update failure".into(),
                });
            }

            self.latency().await;
            self.inner_store.update_cell(cell, value).await
        })
    }
}

impl<S: LedgerStore + Clone, R: Rng> Clone for SimulatedLedger<S, R> {
    fn clone(&self) -> Self {
        SimulatedLedger {
            inner_store: self.inner_store.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}

// ============================================================================
// SimulatedCheckpointStore
// ============================================================================

struct SimulatedCheckpointInner<R: Rng> {
    rng: R,
    persist_failures: u64,
}

/// Checkpoint store wrapper whose persists fail with a given probability
pub struct SimulatedCheckpointStore<C: CheckpointStore, R: Rng> {
    inner_store: C,
    persist_fail_prob: f64,
    state: Arc<Mutex<SimulatedCheckpointInner<R>>>,
}

impl<C: CheckpointStore, R: Rng> SimulatedCheckpointStore<C, R> {
    pub fn new(inner_store: C, rng: R, persist_fail_prob: f64) -> Self {
        SimulatedCheckpointStore {
            inner_store,
            persist_fail_prob,
            state: Arc::new(Mutex::new(SimulatedCheckpointInner {
                rng,
                persist_failures: 0,
            })),
        }
    }

    pub fn persist_failures(&self) -> u64 {
        self.state.lock().persist_failures
    }

    pub fn inner(&self) -> &C {
        &self.inner_store
    }
}

impl<C: CheckpointStore, R: Rng> CheckpointStore for SimulatedCheckpointStore<C, R> {
    fn load(&self) -> CheckpointFuture<'_, Option<u64>> {
        self.inner_store.load()
    }

    fn persist(&self, row: u64) -> CheckpointFuture<'_, ()> {
        Box::pin(async move {
            let fail = {
                let mut s = self.state.lock();
                let hit = crate::buggify!(
                    &mut s.rng,
                    checkpoint_faults::PERSIST_FAIL,
                    self.persist_fail_prob
                );
                if hit {
                    s.persist_failures += 1;
                }
                hit
            };
            if fail {
                return Err(CheckpointError::Io(IoError::new(
                    ErrorKind::Other,
                    "simulated persist failure",
                )));
            }
            self.inner_store.persist(row).await
        })
    }
}

impl<C: CheckpointStore + Clone, R: Rng> Clone for SimulatedCheckpointStore<C, R> {
    fn clone(&self) -> Self {
        SimulatedCheckpointStore {
            inner_store: self.inner_store.clone(),
            persist_fail_prob: self.persist_fail_prob,
            state: self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::simulation::SimulatedRng;
    use crate::sync::checkpoint::MemoryCheckpointStore;
    use crate::sync::ledger_store::InMemoryLedger;

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row::from_cells([format!("2024-05-01 10:00:{:02}", i)]))
            .collect()
    }

    #[tokio::test]
    async fn test_simulated_ledger_no_faults() {
        let inner = InMemoryLedger::new();
        let ledger =
            SimulatedLedger::new(inner.clone(), SimulatedRng::new(42), SimulatedLedgerConfig::no_faults());

        ledger.append_rows(1, &rows(3)).await.unwrap();
        let read = ledger
            .read_range(&CellRange::rows(1, 5, 1, 7))
            .await
            .unwrap();
        assert_eq!(read.len(), 5);
        assert_eq!(inner.next_free_row(), 4);

        let stats = ledger.stats();
        assert_eq!(stats.append_attempts, 1);
        assert_eq!(stats.append_failures, 0);
        assert_eq!(stats.read_attempts, 1);
    }

    #[tokio::test]
    async fn test_simulated_ledger_deterministic() {
        let config = SimulatedLedgerConfig {
            append_fail_prob: 0.5,
            ..SimulatedLedgerConfig::no_faults()
        };
        let a = SimulatedLedger::new(InMemoryLedger::new(), SimulatedRng::new(7), config.clone());
        let b = SimulatedLedger::new(InMemoryLedger::new(), SimulatedRng::new(7), config);

        let batch = rows(1);
        let mut results_a = Vec::new();
        let mut results_b = Vec::new();
        for i in 1..=20 {
            results_a.push(a.append_rows(i, &batch).await.is_ok());
            results_b.push(b.append_rows(i, &batch).await.is_ok());
        }
        assert_eq!(results_a, results_b);
    }

    #[tokio::test]
    async fn test_lost_ack_still_writes() {
        let inner = InMemoryLedger::new();
        let ledger = SimulatedLedger::new(
            inner.clone(),
            SimulatedRng::new(1),
            SimulatedLedgerConfig {
                append_lost_ack_prob: 1.0,
                ..SimulatedLedgerConfig::no_faults()
            },
        );

        let err = ledger.append_rows(10, &rows(2)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Write { .. }));
        assert_eq!(inner.next_free_row(), 12);
        assert_eq!(ledger.stats().lost_acks, 1);
    }

    #[tokio::test]
    async fn test_append_fail_leaves_ledger_untouched() {
        let inner = InMemoryLedger::new();
        let ledger = SimulatedLedger::new(
            inner.clone(),
            SimulatedRng::new(1),
            SimulatedLedgerConfig {
                append_fail_prob: 1.0,
                ..SimulatedLedgerConfig::no_faults()
            },
        );

        assert!(ledger.append_rows(10, &rows(2)).await.is_err());
        assert_eq!(inner.next_free_row(), 1);
    }

    #[tokio::test]
    async fn test_short_read_only_drops_blank_tail() {
        let inner = InMemoryLedger::new();
        inner.append_rows(1, &rows(3)).await.unwrap();
        let ledger = SimulatedLedger::new(
            inner,
            SimulatedRng::new(3),
            SimulatedLedgerConfig {
                read_short_prob: 1.0,
                ..SimulatedLedgerConfig::no_faults()
            },
        );

        for _ in 0..20 {
            let read = ledger
                .read_range(&CellRange::rows(1, 10, 1, 7))
                .await
                .unwrap();
            assert!(read.len() >= 3);
        }
    }

    #[tokio::test]
    async fn test_simulated_checkpoint_failure() {
        let inner = MemoryCheckpointStore::with_value(5);
        let store = SimulatedCheckpointStore::new(inner.clone(), SimulatedRng::new(9), 1.0);

        assert!(store.persist(6).await.is_err());
        assert_eq!(store.load().await.unwrap(), Some(5));
        assert_eq!(store.persist_failures(), 1);
        assert!(inner.history().is_empty());
    }
}

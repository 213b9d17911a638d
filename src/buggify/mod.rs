//! BUGGIFY - FoundationDB-Style Fault Injection
//!
//! Every remote call in the simulated ledger is a potential fault site.
//! Decisions draw from the caller's [`Rng`](crate::io::Rng), so a seeded
//! generator replays the exact same fault sequence.
//!
//! ```ignore
//! if buggify!(&mut rng, faults::ledger::APPEND_FAIL, 0.05) {
//!     return Err(LedgerError::simulated("append"));
//! }
//! ```

pub mod config;
pub mod faults;

pub use config::FaultConfig;
pub use faults::ALL_FAULTS;

use std::cell::RefCell;
use std::collections::HashMap;

/// Check and trigger counters per fault ID
#[derive(Debug, Clone, Default)]
pub struct BuggifyStats {
    pub checks: HashMap<String, u64>,
    pub triggers: HashMap<String, u64>,
}

impl BuggifyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_check(&mut self, fault_id: &str) {
        *self.checks.entry(fault_id.to_string()).or_insert(0) += 1;
    }

    pub fn record_trigger(&mut self, fault_id: &str) {
        *self.triggers.entry(fault_id.to_string()).or_insert(0) += 1;
    }

    pub fn trigger_count(&self, fault_id: &str) -> u64 {
        self.triggers.get(fault_id).copied().unwrap_or(0)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec!["BUGGIFY Statistics:".to_string()];

        let mut sorted: Vec<_> = self.checks.keys().collect();
        sorted.sort();

        for fault_id in sorted {
            let checks = self.checks.get(fault_id).copied().unwrap_or(0);
            let triggers = self.trigger_count(fault_id);
            lines.push(format!("  {}: {}/{}", fault_id, triggers, checks));
        }

        lines.join("\n")
    }
}

thread_local! {
    static BUGGIFY_CONTEXT: RefCell<BuggifyContext> = RefCell::new(BuggifyContext::default());
}

/// Per-thread buggify context
#[derive(Debug, Default)]
pub struct BuggifyContext {
    pub config: FaultConfig,
    pub stats: BuggifyStats,
    /// When true, all buggify calls return false
    pub suppressed: bool,
}

/// Set the buggify configuration for the current thread
pub fn set_config(config: FaultConfig) {
    BUGGIFY_CONTEXT.with(|ctx| {
        ctx.borrow_mut().config = config;
    });
}

/// Current buggify stats for the thread
pub fn get_stats() -> BuggifyStats {
    BUGGIFY_CONTEXT.with(|ctx| ctx.borrow().stats.clone())
}

pub fn reset_stats() {
    BUGGIFY_CONTEXT.with(|ctx| {
        ctx.borrow_mut().stats = BuggifyStats::new();
    });
}

/// Suppresses buggify until dropped
pub struct BuggifySuppressor;

impl BuggifySuppressor {
    pub fn new() -> Self {
        BUGGIFY_CONTEXT.with(|ctx| {
            ctx.borrow_mut().suppressed = true;
        });
        BuggifySuppressor
    }
}

impl Default for BuggifySuppressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BuggifySuppressor {
    fn drop(&mut self) {
        BUGGIFY_CONTEXT.with(|ctx| {
            ctx.borrow_mut().suppressed = false;
        });
    }
}

/// Check a fault using its configured probability
#[inline]
pub fn should_buggify<R: crate::io::Rng>(rng: &mut R, fault_id: &str) -> bool {
    BUGGIFY_CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.stats.record_check(fault_id);

        if ctx.suppressed {
            return false;
        }

        let prob = ctx.config.get(fault_id);
        if prob <= 0.0 {
            return false;
        }

        let triggered = rng.gen_range(0, 1_000_000) as f64 / 1_000_000.0 < prob;
        if triggered {
            ctx.stats.record_trigger(fault_id);
        }
        triggered
    })
}

/// Check a fault with an explicit probability
#[inline]
pub fn should_buggify_with_prob<R: crate::io::Rng>(
    rng: &mut R,
    fault_id: &str,
    probability: f64,
) -> bool {
    BUGGIFY_CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.stats.record_check(fault_id);

        if ctx.suppressed || !ctx.config.enabled {
            return false;
        }

        let random_value = rng.gen_range(0, 1_000_000) as f64 / 1_000_000.0;
        let triggered = random_value < probability.clamp(0.0, 1.0);
        if triggered {
            ctx.stats.record_trigger(fault_id);
        }
        triggered
    })
}

/// BUGGIFY macro
///
/// `buggify!(rng, id)` uses the configured probability,
/// `buggify!(rng, id, prob)` overrides it.
#[macro_export]
macro_rules! buggify {
    ($rng:expr, $fault_id:expr) => {
        $crate::buggify::should_buggify($rng, $fault_id)
    };
    ($rng:expr, $fault_id:expr, $prob:expr) => {
        $crate::buggify::should_buggify_with_prob($rng, $fault_id, $prob)
    };
}

/// Suppress all buggify calls while the returned guard lives
#[macro_export]
macro_rules! suppress_buggify {
    () => {
        $crate::buggify::BuggifySuppressor::new()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SimulatedRng;

    #[test]
    fn test_buggify_disabled() {
        set_config(FaultConfig::disabled());
        let mut rng = SimulatedRng::new(1);

        for _ in 0..1000 {
            assert!(!buggify!(&mut rng, faults::ledger::APPEND_FAIL, 1.0));
        }
        set_config(FaultConfig::new());
    }

    #[test]
    fn test_buggify_with_prob() {
        set_config(FaultConfig::new());
        let mut rng = SimulatedRng::new(2);

        let always = (0..100).filter(|_| buggify!(&mut rng, "test.always", 1.0)).count();
        assert_eq!(always, 100);

        let never = (0..100).filter(|_| buggify!(&mut rng, "test.never", 0.0)).count();
        assert_eq!(never, 0);
    }

    #[test]
    fn test_buggify_stats() {
        reset_stats();
        set_config(FaultConfig::moderate());
        let mut rng = SimulatedRng::new(3);

        for _ in 0..1000 {
            let _ = buggify!(&mut rng, faults::ledger::UPDATE_FAIL);
        }

        let stats = get_stats();
        assert_eq!(stats.checks.get(faults::ledger::UPDATE_FAIL), Some(&1000));
        let triggers = stats.trigger_count(faults::ledger::UPDATE_FAIL);
        assert!(triggers > 0 && triggers < 100, "triggers: {}", triggers);
        set_config(FaultConfig::new());
    }

    #[test]
    fn test_buggify_suppression() {
        set_config(FaultConfig::new());
        let mut rng = SimulatedRng::new(4);

        {
            let _guard = suppress_buggify!();
            for _ in 0..100 {
                assert!(!buggify!(&mut rng, faults::ledger::READ_FAIL, 1.0));
            }
        }

        assert!(buggify!(&mut rng, "test.after_suppress", 1.0));
    }
}

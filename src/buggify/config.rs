//! Fault probability configuration

use super::faults::ALL_FAULTS;
use std::collections::HashMap;

/// Per-fault probabilities plus a global switch and multiplier
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Master switch; when false no fault ever triggers
    pub enabled: bool,
    /// Scales every configured probability
    pub multiplier: f64,
    probabilities: HashMap<String, f64>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultConfig {
    /// Enabled, with no named probabilities (explicit-probability checks only)
    pub fn new() -> Self {
        FaultConfig {
            enabled: true,
            multiplier: 1.0,
            probabilities: HashMap::new(),
        }
    }

    /// Nothing triggers
    pub fn disabled() -> Self {
        FaultConfig {
            enabled: false,
            ..Self::new()
        }
    }

    /// Default probabilities from the fault catalogue
    pub fn moderate() -> Self {
        let mut config = Self::new();
        for (id, prob) in ALL_FAULTS {
            config.set(id, *prob);
        }
        config
    }

    /// Catalogue probabilities scaled up tenfold
    pub fn chaos() -> Self {
        FaultConfig {
            multiplier: 10.0,
            ..Self::moderate()
        }
    }

    pub fn set(&mut self, fault_id: &str, probability: f64) {
        self.probabilities
            .insert(fault_id.to_string(), probability.clamp(0.0, 1.0));
    }

    /// Effective probability for a fault (0.0 when disabled or unknown)
    pub fn get(&self, fault_id: &str) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        let base = self.probabilities.get(fault_id).copied().unwrap_or(0.0);
        (base * self.multiplier).clamp(0.0, 1.0)
    }
}

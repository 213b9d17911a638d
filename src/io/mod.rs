//! I/O Abstractions
//!
//! Randomness used by fault injection goes through the [`Rng`] trait so the
//! simulated ledger and the workload generator replay from a seed.

pub mod simulation;

pub use simulation::SimulatedRng;

/// Source of randomness for fault injection and workload generation
pub trait Rng: Send + 'static {
    /// Next raw 64-bit value
    fn next_u64(&mut self) -> u64;

    /// `true` with the given probability (clamped to 0.0..=1.0)
    fn gen_bool(&mut self, probability: f64) -> bool;

    /// Uniform value in `min..max`; returns `min` when the range is empty
    fn gen_range(&mut self, min: u64, max: u64) -> u64;
}

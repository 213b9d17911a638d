//! Named fault injection points
//!
//! Fault IDs are namespaced by subsystem so statistics can be grouped.

/// Faults injected by the simulated ledger store
pub mod ledger {
    /// Range read fails
    pub const READ_FAIL: &str = "ledger.read_fail";
    /// Range read returns fewer rows than requested
    pub const READ_SHORT: &str = "ledger.read_short";
    /// Row append fails before touching the ledger
    pub const APPEND_FAIL: &str = "ledger.append_fail";
    /// Row append lands on the ledger but the caller sees an error
    pub const APPEND_LOST_ACK: &str = "ledger.append_lost_ack";
    /// Single-cell update fails
    pub const UPDATE_FAIL: &str = "ledger.update_fail";
    /// Request times out
    pub const TIMEOUT: &str = "ledger.timeout";
}

/// Faults injected by the simulated checkpoint store
pub mod checkpoint {
    /// Persisting the checkpoint fails
    pub const PERSIST_FAIL: &str = "checkpoint.persist_fail";
}

/// Every fault ID with its default probability
pub const ALL_FAULTS: &[(&str, f64)] = &[
    (ledger::READ_FAIL, 0.01),
    (ledger::READ_SHORT, 0.01),
    (ledger::APPEND_FAIL, 0.01),
    (ledger::APPEND_LOST_ACK, 0.005),
    (ledger::UPDATE_FAIL, 0.02),
    (ledger::TIMEOUT, 0.005),
    (checkpoint::PERSIST_FAIL, 0.005),
];

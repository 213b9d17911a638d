//! Ledger Sync DST Tests
//!
//! Deterministic simulation tests (FoundationDB-style, seed-based) for the
//! sync driver. Each run feeds a generated event stream through a real
//! `SyncDriver` while the ledger fails, the process crashes and people edit
//! the sheet, then checks the ledger against a shadow model.
//!
//! ## Test Categories
//!
//! - **Calm tests**: No faults, verify basic correctness
//! - **Moderate tests**: Some faults, verify resilience
//! - **Chaos tests**: Many faults, stress test

use ledger_sync::sync::{
    run_dst_batch, summarize_batch, SyncDSTConfig, SyncDSTHarness,
};

// =============================================================================
// Single Seed Tests
// =============================================================================

#[tokio::test]
async fn test_sync_dst_single_calm() {
    let config = SyncDSTConfig::calm(12345);
    let mut harness = SyncDSTHarness::new(config).await;

    harness.run(500).await;
    harness.check_invariants().await;

    let result = harness.result();
    println!("{}", result.summary());

    assert!(
        result.is_success(),
        "Calm mode should not violate invariants: {:?}",
        result.invariant_violations
    );
    assert!(result.total_operations >= 500);
    assert_eq!(result.failed_passes, 0);
}

#[tokio::test]
async fn test_sync_dst_single_moderate() {
    let config = SyncDSTConfig::moderate(54321);
    let mut harness = SyncDSTHarness::new(config).await;

    harness.run(300).await;
    harness.check_invariants().await;

    let result = harness.result();
    println!("{}", result.summary());

    assert!(result.total_operations >= 300);
    assert!(
        result.is_success(),
        "Moderate faults must not corrupt the ledger: {:?}",
        result.invariant_violations
    );
}

#[tokio::test]
async fn test_sync_dst_single_chaos() {
    let config = SyncDSTConfig::chaos(99999);
    let mut harness = SyncDSTHarness::new(config).await;

    harness.run(200).await;
    harness.check_invariants().await;

    let result = harness.result();
    println!("{}", result.summary());
    println!("Ledger stats: {:?}", result.ledger_stats);

    assert!(result.total_operations >= 200);
    assert!(
        result.is_success(),
        "Faults may slow the sync down but never corrupt the ledger: {:?}",
        result.invariant_violations
    );
}

// =============================================================================
// Multi-Seed Batch Tests (DST)
// =============================================================================

#[tokio::test]
async fn test_sync_dst_100_seeds_calm() {
    let results = run_dst_batch(0, 100, 100, SyncDSTConfig::calm).await;

    let summary = summarize_batch(&results);
    println!("100 Seeds Calm:\n{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(
        passed,
        results.len(),
        "All calm runs should pass. Failed seeds: {:?}",
        results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.seed)
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_sync_dst_100_seeds_moderate() {
    let results = run_dst_batch(1000, 100, 100, SyncDSTConfig::moderate).await;

    let summary = summarize_batch(&results);
    println!("100 Seeds Moderate:\n{}", summary);

    let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
    assert!(
        failed.is_empty(),
        "Moderate runs violated invariants: {:?}",
        failed
            .iter()
            .map(|r| (r.seed, &r.invariant_violations))
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_sync_dst_50_seeds_chaos() {
    let results = run_dst_batch(2000, 50, 100, SyncDSTConfig::chaos).await;

    let summary = summarize_batch(&results);
    println!("50 Seeds Chaos:\n{}", summary);

    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    assert!(
        total_ops >= 50 * 100,
        "Should complete all operations: {}",
        total_ops
    );
    let failed_passes: u64 = results.iter().map(|r| r.failed_passes).sum();
    assert!(failed_passes > 0, "Chaos should make some passes fail");
}

// =============================================================================
// Stress Tests (longer runs)
// =============================================================================

#[tokio::test]
async fn test_sync_dst_stress_calm_1000_ops() {
    let config = SyncDSTConfig::calm(7777);
    let mut harness = SyncDSTHarness::new(config).await;

    harness.run(1000).await;
    harness.check_invariants().await;

    let result = harness.result();
    println!("Stress 1000 ops:\n{}", result.summary());

    assert!(result.is_success(), "{:?}", result.invariant_violations);
    assert!(result.passes > 0, "Should have some passes");
    assert!(!harness.ledger().non_blank_rows().is_empty());
}

#[tokio::test]
async fn test_sync_dst_crash_recovery_stress() {
    let mut config = SyncDSTConfig::calm(8888);
    config.crash_probability = 0.15;

    let mut harness = SyncDSTHarness::new(config).await;
    harness.run(500).await;
    harness.check_invariants().await;

    let result = harness.result();
    println!("Crash Recovery Stress:\n{}", result.summary());

    assert!(result.crashes > 0, "Should have some crashes");
    assert!(result.is_success(), "{:?}", result.invariant_violations);
}

#[tokio::test]
async fn test_sync_dst_human_edits_and_replays() {
    let mut config = SyncDSTConfig::calm(4242);
    config.human_edit_probability = 0.15;
    config.replay_probability = 0.15;

    let mut harness = SyncDSTHarness::new(config).await;
    harness.run(400).await;
    harness.check_invariants().await;

    let result = harness.result();
    println!("Edits and Replays:\n{}", result.summary());

    assert!(result.human_edits > 0);
    assert!(result.replays > 0);
    assert!(result.is_success(), "{:?}", result.invariant_violations);
}

// =============================================================================
// Determinism Verification
// =============================================================================

#[tokio::test]
async fn test_sync_dst_determinism() {
    async fn run_seed(seed: u64) -> (u64, u64, u64, Vec<(u64, Vec<String>)>) {
        let config = SyncDSTConfig::moderate(seed);
        let mut harness = SyncDSTHarness::new(config).await;
        harness.run(100).await;
        harness.check_invariants().await;
        let result = harness.result();
        (
            result.passes,
            result.failed_passes,
            result.crashes,
            harness.ledger().non_blank_rows(),
        )
    }

    let seed = 42424242;
    let run1 = run_seed(seed).await;
    let run2 = run_seed(seed).await;

    assert_eq!(run1, run2, "Same seed should produce identical results");
}

// =============================================================================
// Large Scale Tests (run with --release for reasonable times)
// =============================================================================

#[tokio::test]
#[ignore] // Run with: cargo test --release -- --ignored
async fn test_sync_dst_1000_seeds_chaos() {
    let results = run_dst_batch(10000, 1000, 200, SyncDSTConfig::chaos).await;

    let summary = summarize_batch(&results);
    println!("1000 Seeds Chaos:\n{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, results.len(), "All chaos runs should keep invariants");
}

// =============================================================================
// Specific Regression Tests
// =============================================================================

#[tokio::test]
async fn test_sync_dst_rapid_crash_recovery() {
    let mut config = SyncDSTConfig::calm(22222);
    config.crash_probability = 0.3;
    config.pass_probability = 0.3;

    let mut harness = SyncDSTHarness::new(config).await;
    harness.run(200).await;
    harness.check_invariants().await;

    let result = harness.result();
    println!("Rapid crash recovery:\n{}", result.summary());

    assert!(result.is_success(), "{:?}", result.invariant_violations);
}

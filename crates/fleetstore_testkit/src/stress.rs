//! Concurrent load against a store.
//!
//! Drives many threads through create-and-save cycles so tests can check
//! that every mutation reaches the file and writes were coalesced.

use crate::fixtures::root_context;
use fleetstore_core::models::Claim;
use fleetstore_core::JsonDatabase;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Operations that succeeded.
    pub successful_ops: usize,
    /// Operations that failed.
    pub failed_ops: usize,
    /// Wall time of the run.
    pub duration: Duration,
    /// Physical writes performed during the run.
    pub disk_writes: u64,
}

impl StressResult {
    /// Total operations attempted.
    pub fn total_ops(&self) -> usize {
        self.successful_ops + self.failed_ops
    }

    /// Operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops() as f64 / secs
        } else {
            0.0
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Operations: {} ok, {} failed", self.successful_ops, self.failed_ops);
        println!("Disk writes: {}", self.disk_writes);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second());
    }
}

/// Shape of a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of writer threads.
    pub threads: usize,
    /// Claims each thread creates.
    pub ops_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            ops_per_thread: 25,
        }
    }
}

/// Name of the claim created by `thread` for operation `op`.
pub fn stress_claim_name(thread: usize, op: usize) -> String {
    format!("STRESS_{thread}_{op}")
}

/// Has every thread create distinct claims, each followed by a waited save.
pub fn stress_concurrent_saves(db: &Arc<JsonDatabase>, config: &StressConfig) -> StressResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let writes_before = db.stats().disk_writes();
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let ops = config.ops_per_thread;
            thread::spawn(move || {
                let ctx = root_context();
                for op in 0..ops {
                    match db.create_claim(&ctx, Claim::new(stress_claim_name(t, op))) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Stress thread panicked");
    }

    StressResult {
        successful_ops: successful.load(Ordering::Relaxed),
        failed_ops: failed.load(Ordering::Relaxed),
        duration: start.elapsed(),
        disk_writes: db.stats().disk_writes() - writes_before,
    }
}

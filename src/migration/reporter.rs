//! Operator-facing output boundary.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{error, info};

/// Narrow progress and log interface. The engine never formats terminal
/// output itself; the CLI supplies a progress-bar implementation.
pub trait Reporter: Send + Sync {
    fn info(&self, message: &str);

    fn error(&self, message: &str);

    /// Start a progress unit of `total` records.
    fn progress(&self, total: u64);

    /// One record processed.
    fn advance(&self);

    /// The current progress unit is done.
    fn finish(&self) {}
}

/// Reporter that forwards to `tracing`, for library use and tests.
#[derive(Debug, Default)]
pub struct TracingReporter {
    total: AtomicU64,
    done: AtomicU64,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reporter for TracingReporter {
    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }

    fn progress(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }

    fn advance(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        info!(
            "Processed {}/{} records",
            self.done.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed)
        );
    }
}

//! Human-readable document numbers (`QT-000001`, `PO-000001`).

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide monotonically increasing number sequence for one prefix.
#[derive(Debug)]
pub struct NumberSequence {
    prefix: String,
    next: AtomicU64,
}

impl NumberSequence {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 1)
    }

    /// Resume after the highest number already issued.
    pub fn starting_at(prefix: impl Into<String>, first: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(first.max(1)),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next_number(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:06}", self.prefix, n)
    }
}

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Lock-free progress of one run, shared by every worker and polled by the UI.
///
/// `position` counts file bytes whose candidates have been fully tested,
/// including the offset the run resumed from, so it maps directly to a
/// checkpoint value.
#[derive(Debug, Default)]
pub struct SearchProgress {
    total: u64,
    consumed: AtomicU64,
    found: AtomicBool,
}

impl SearchProgress {
    pub fn new(total: u64) -> Self {
        Self::resuming_at(total, 0)
    }

    pub fn resuming_at(total: u64, offset: u64) -> Self {
        Self {
            total,
            consumed: AtomicU64::new(offset),
            found: AtomicBool::new(false),
        }
    }

    pub fn advance(&self, bytes: u64) {
        self.consumed.fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn position(&self) -> u64 {
        self.consumed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Fraction of the source completed, `1.0` only once everything is done.
    pub fn ratio(&self) -> f64 {
        let done = self.position();
        if done >= self.total {
            1.0
        } else {
            (done as f64 / self.total as f64).min(1.0 - f64::EPSILON)
        }
    }

    /// Whole percent, rounded down so 100 is only reported at end-of-source.
    pub fn percent(&self) -> u8 {
        let done = self.position();
        if done >= self.total {
            return 100;
        }
        ((done as u128 * 100) / self.total as u128) as u8
    }

    /// Returns `true` for the single caller that flips the flag.
    pub fn mark_found(&self) -> bool {
        self.found
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_found(&self) -> bool {
        self.found.load(Ordering::Acquire)
    }
}

//! Scheduler performance counters.

use core::sync::atomic::{AtomicU64, Ordering};

/// Per-CPU scheduler counters. All relaxed; read for diagnostics only.
pub struct SchedStats {
    /// Selection passes that handed the CPU to a different thread.
    pub switches: AtomicU64,
    /// Real-time threads that displaced a running thread mid-budget.
    pub preemptions: AtomicU64,
    /// Periodic releases (pending -> runnable, including re-releases).
    pub releases: AtomicU64,
    /// Periodic threads observed past their deadline.
    pub deadline_misses: AtomicU64,
    /// Threads accepted by the admission controller.
    pub admitted: AtomicU64,
    /// Threads rejected by the admission controller.
    pub denied: AtomicU64,
    /// Exited threads purged and reclaimed.
    pub reclaimed: AtomicU64,
}

impl SchedStats {
    pub const fn new() -> Self {
        Self {
            switches: AtomicU64::new(0),
            preemptions: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            deadline_misses: AtomicU64::new(0),
            admitted: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
        }
    }

    pub fn record_switch(&self) {
        self.switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preemption(&self) {
        self.preemptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deadline_miss(&self) {
        self.deadline_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reclaimed(&self) {
        self.reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy for reporting.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            switches: self.switches.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            deadline_misses: self.deadline_misses.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub switches: u64,
    pub preemptions: u64,
    pub releases: u64,
    pub deadline_misses: u64,
    pub admitted: u64,
    pub denied: u64,
    pub reclaimed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_snapshots() {
        let stats = SchedStats::new();
        stats.record_switch();
        stats.record_switch();
        stats.record_deadline_miss();

        let snap = stats.snapshot();
        assert_eq!(snap.switches, 2);
        assert_eq!(snap.deadline_misses, 1);
        assert_eq!(snap.preemptions, 0);
    }
}

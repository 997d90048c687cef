//! Per-CPU timing record and one-shot interval computation.
//!
//! Every selection pass records when it ran, when the chosen thread is
//! expected to take the CPU, and the interval written into the hardware
//! one-shot timer. The interval calculation is shared by the live selection
//! engine and the admission simulator.

use crate::config::QUANTUM;
use crate::thread::{Constraints, RtThread};

/// What the last selection pass decided about time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingRecord {
    /// Cycle count when the pass ran.
    pub start_time: u64,
    /// Estimated cycle count at which the chosen thread begins.
    pub end_time: u64,
    /// Interval written into the one-shot timer.
    pub set_time: u64,
}

impl TimingRecord {
    pub const fn new() -> Self {
        Self {
            start_time: 0,
            end_time: 0,
            set_time: 0,
        }
    }
}

/// Interval until the next forced selection pass.
///
/// Bounded above by the earliest pending release (`pending_min`), so a
/// sleeping periodic thread is woken on time, and by the chosen thread's
/// remaining budget (real-time) or the scheduling quantum (aperiodic).
pub fn oneshot_interval(
    pending_min: Option<u64>,
    next: &RtThread,
    end_time: u64,
    slack: u64,
) -> u64 {
    let until_release = pending_min
        .map(|deadline| deadline.saturating_sub(end_time))
        .unwrap_or(u64::MAX);

    match next.constraints() {
        Constraints::Periodic { slice, .. } => {
            let remaining = slice.saturating_sub(next.run_time());
            until_release.min(remaining).saturating_add(slack)
        }
        Constraints::Sporadic { work } => {
            let remaining = work.saturating_sub(next.run_time());
            until_release.min(remaining).saturating_add(slack)
        }
        Constraints::Aperiodic { .. } => until_release.min(QUANTUM),
    }
}

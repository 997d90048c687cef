//! Admission control.
//!
//! A real-time thread joins the CPU only if the utilization it adds keeps
//! the task set inside the configured ceilings. Periodic admission
//! additionally replays the selection engine over a cloned snapshot of the
//! queues and refuses candidates whose arrival would make an existing
//! thread miss a deadline in simulation.

use alloc::sync::Arc;

use crate::config::{PERIODIC_UTIL, SIM_MAX_STEPS, SPORADIC_UTIL, UTIL_SCALE};
use crate::error::SchedError;
use crate::queue::ThreadHeap;
use crate::sched::scheduler::RtScheduler;
use crate::sched::simulator::Simulator;
use crate::thread::{Constraints, RtKind, RtThread};

impl RtScheduler {
    /// Decide whether `thread` may join this CPU, judged at time `now`.
    ///
    /// Aperiodic threads are always admitted; they only consume slack.
    pub fn admit_at(&self, thread: &Arc<RtThread>, now: u64) -> bool {
        let accepted = match thread.kind() {
            RtKind::Aperiodic => true,
            RtKind::Sporadic => self.admit_sporadic(now),
            RtKind::Periodic => self.admit_periodic(thread, now),
        };
        if accepted {
            self.stats().record_admitted();
        } else {
            self.stats().record_denied();
        }
        accepted
    }

    fn admit_periodic(&self, thread: &Arc<RtThread>, now: u64) -> bool {
        let standing = periodic_utilization(self.runnable_heap(), self.pending_heap());
        let contribution = periodic_contribution(thread);
        if standing + contribution > PERIODIC_UTIL {
            let err = SchedError::AdmissionDenied {
                utilization: standing + contribution,
                limit: PERIODIC_UTIL,
            };
            log::warn!("cpu {}: periodic {}", self.cpu(), err);
            return false;
        }

        // Utilization alone ignores release phasing; replay the selection
        // engine over a snapshot to catch induced misses.
        match Simulator::capture(self, thread) {
            Ok(sim) => {
                let replay = sim.replay(now, SIM_MAX_STEPS);
                if replay.missed > 0 {
                    log::warn!(
                        "cpu {}: periodic admission denied, {} simulated deadline miss(es) over {} decisions",
                        self.cpu(),
                        replay.missed,
                        replay.steps
                    );
                    return false;
                }
                true
            }
            Err(err) => {
                // Snapshot failed (queues at capacity); fall back to the
                // utilization verdict already computed.
                log::debug!("cpu {}: admission simulation skipped: {}", self.cpu(), err);
                true
            }
        }
    }

    fn admit_sporadic(&self, now: u64) -> bool {
        let standing = sporadic_utilization(self.runnable_heap(), now);
        if standing > SPORADIC_UTIL {
            let err = SchedError::AdmissionDenied {
                utilization: standing,
                limit: SPORADIC_UTIL,
            };
            log::warn!("cpu {}: sporadic {}", self.cpu(), err);
            return false;
        }
        true
    }
}

/// Scaled utilization claimed by one periodic thread.
fn periodic_contribution(thread: &RtThread) -> u64 {
    match thread.constraints() {
        Constraints::Periodic { period, slice } => slice * UTIL_SCALE / period,
        _ => 0,
    }
}

/// Σ slice·scale/period over the live periodic threads of both heaps.
pub(crate) fn periodic_utilization(runnable: &ThreadHeap, pending: &ThreadHeap) -> u64 {
    runnable
        .iter()
        .chain(pending.iter())
        .filter(|t| !t.is_defunct())
        .map(|t| periodic_contribution(t))
        .sum()
}

/// Σ work·scale/laxity over the live sporadic threads of the runnable heap.
pub(crate) fn sporadic_utilization(runnable: &ThreadHeap, now: u64) -> u64 {
    runnable
        .iter()
        .filter(|t| !t.is_defunct())
        .map(|t| match t.constraints() {
            Constraints::Sporadic { work } => {
                let laxity = t.deadline().saturating_sub(now).max(1);
                work * UTIL_SCALE / laxity
            }
            _ => 0,
        })
        .sum()
}

//! Admission simulator.
//!
//! A side-effect-free copy of the three ordered queues, built by deep
//! cloning live descriptors, over which the selection logic can be played
//! forward from an externally supplied clock. Each step picks the thread
//! the real engine would pick, then charges it the full interval the
//! one-shot timer would have been armed with. Simulated deadline misses
//! are counted and reported; nothing the simulator does is visible to the
//! live scheduler, and the whole snapshot is dropped after the trial.

use alloc::sync::Arc;

use crate::error::SchedResult;
use crate::queue::ThreadHeap;
use crate::sched::scheduler::RtScheduler;
use crate::thread::{Constraints, RtKind, RtThread};
use crate::timing::oneshot_interval;

/// Isolated copy of the schedulable state of one CPU.
pub struct Simulator {
    runnable: ThreadHeap,
    pending: ThreadHeap,
    aperiodic: ThreadHeap,
    current: Option<Arc<RtThread>>,
    missed: u64,
}

/// Outcome of a bounded replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replay {
    /// Selection decisions actually taken.
    pub steps: usize,
    /// Deadline misses observed along the way.
    pub missed: u64,
    /// Simulated clock when the replay stopped.
    pub horizon: u64,
}

impl Simulator {
    /// Snapshot a scheduler's ordered queues plus an admission candidate.
    ///
    /// Every descriptor is cloned detached, so the snapshot shares nothing
    /// mutable with the live state.
    pub fn capture(sched: &RtScheduler, candidate: &Arc<RtThread>) -> SchedResult<Self> {
        let mut sim = Self {
            runnable: ThreadHeap::runnable(),
            pending: ThreadHeap::pending(),
            aperiodic: ThreadHeap::aperiodic(),
            current: None,
            missed: 0,
        };
        for t in sched.runnable_heap().iter().filter(|t| !t.is_defunct()) {
            sim.runnable.enqueue(t.clone_detached())?;
        }
        for t in sched.pending_heap().iter().filter(|t| !t.is_defunct()) {
            sim.pending.enqueue(t.clone_detached())?;
        }
        for t in sched.aperiodic_heap().iter().filter(|t| !t.is_defunct()) {
            sim.aperiodic.enqueue(t.clone_detached())?;
        }
        sim.runnable.enqueue(candidate.clone_detached())?;
        Ok(sim)
    }

    /// Play the selection logic forward for at most `max_steps` decisions,
    /// starting the simulated clock at `start`.
    pub fn replay(mut self, start: u64, max_steps: usize) -> Replay {
        let mut now = start;
        let mut steps = 0;
        while steps < max_steps {
            let (chosen, interval) = match self.step(now) {
                Some(decision) => decision,
                None => break,
            };
            // Charge the chosen thread the whole armed interval. The
            // clock must advance even when the interval collapses to
            // zero, or the replay would spin on one release edge.
            let interval = interval.max(1);
            chosen.note_enter(now);
            now = now.saturating_add(interval);
            chosen.note_exit(now);
            steps += 1;
        }
        Replay {
            steps,
            missed: self.missed,
            horizon: now,
        }
    }

    /// One selection decision at time `now`: the pure mirror of the live
    /// engine's release/dispatch/timer steps.
    fn step(&mut self, now: u64) -> Option<(Arc<RtThread>, u64)> {
        loop {
            let due = self
                .pending
                .peek()
                .map(|t| t.deadline() < now)
                .unwrap_or(false);
            if !due {
                break;
            }
            let released = match self.pending.dequeue() {
                Ok(t) => t,
                Err(_) => break,
            };
            if released.deadline() >= now {
                // Tombstones at the root made the peek stale.
                let _ = self.pending.enqueue(released);
                break;
            }
            released.release(now);
            if self.runnable.enqueue(released).is_err() {
                break;
            }
        }

        let chosen = match self.current.take() {
            None => self.pick()?,
            Some(c) => match c.kind() {
                RtKind::Aperiodic => {
                    c.age_priority();
                    let _ = self.aperiodic.enqueue(c);
                    self.pick()?
                }
                RtKind::Sporadic => {
                    let work = match c.constraints() {
                        Constraints::Sporadic { work } => *work,
                        _ => 0,
                    };
                    if c.run_time() >= work {
                        if now > c.deadline() {
                            self.missed += 1;
                        }
                        self.pick()?
                    } else {
                        self.continue_or_preempt(c)
                    }
                }
                RtKind::Periodic => {
                    let slice = match c.constraints() {
                        Constraints::Periodic { slice, .. } => *slice,
                        _ => 0,
                    };
                    if c.run_time() >= slice {
                        if now > c.deadline() {
                            self.missed += 1;
                            c.release(now);
                            let _ = self.runnable.enqueue(c);
                        } else {
                            let _ = self.pending.enqueue(c);
                        }
                        self.pick()?
                    } else {
                        self.continue_or_preempt(c)
                    }
                }
            },
        };

        let pending_min = self.pending.peek().map(|t| t.deadline());
        let interval = oneshot_interval(pending_min, &chosen, now, 0);
        self.current = Some(chosen.clone());
        Some((chosen, interval))
    }

    fn continue_or_preempt(&mut self, c: Arc<RtThread>) -> Arc<RtThread> {
        let earlier = self
            .runnable
            .peek()
            .map(|t| t.deadline() < c.deadline())
            .unwrap_or(false);
        if earlier {
            if let Ok(next) = self.runnable.dequeue() {
                if next.deadline() >= c.deadline() {
                    // Tombstones at the root made the peek stale.
                    let _ = self.runnable.enqueue(next);
                    return c;
                }
                let _ = self.runnable.enqueue(c);
                return next;
            }
        }
        c
    }

    fn pick(&mut self) -> Option<Arc<RtThread>> {
        if let Ok(next) = self.runnable.dequeue() {
            return Some(next);
        }
        self.aperiodic.dequeue().ok()
    }
}

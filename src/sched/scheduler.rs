//! Per-CPU scheduler state and the selection engine.
//!
//! One `RtScheduler` exists per CPU and is only ever touched from that
//! CPU's ISR context or from the running thread trapping in, so there is
//! no locking inside the scheduler itself. The selection engine implements
//! earliest-deadline-first over the runnable heap, releases pending
//! periodic threads as their activations come due, ages aperiodic
//! priorities, and reports (but does not kill) deadline misses.

use alloc::sync::Arc;

use crate::error::{SchedError, SchedResult};
use crate::queue::{ThreadHeap, ThreadRing};
use crate::sched::stats::SchedStats;
use crate::thread::{Constraints, ContainerTag, RtKind, RtStatus, RtThread};
use crate::timing::{oneshot_interval, TimingRecord};

/// Scheduler state for one CPU.
pub struct RtScheduler {
    cpu: u32,
    runnable: ThreadHeap,
    pending: ThreadHeap,
    aperiodic: ThreadHeap,
    arrival: ThreadRing,
    waiting: ThreadRing,
    sleeping: ThreadRing,
    exited: ThreadRing,
    current: Option<Arc<RtThread>>,
    timing: TimingRecord,
    resched_cost: u64,
    stats: SchedStats,
}

impl RtScheduler {
    /// Empty containers plus the resident main thread on the aperiodic
    /// heap. The main thread guarantees the selection engine always has
    /// something to run.
    pub fn new(cpu: u32, main_thread: Arc<RtThread>) -> Self {
        let mut sched = Self {
            cpu,
            runnable: ThreadHeap::runnable(),
            pending: ThreadHeap::pending(),
            aperiodic: ThreadHeap::aperiodic(),
            arrival: ThreadRing::new(ContainerTag::Arrival),
            waiting: ThreadRing::new(ContainerTag::Waiting),
            sleeping: ThreadRing::new(ContainerTag::Sleeping),
            exited: ThreadRing::new(ContainerTag::Exited),
            current: None,
            timing: TimingRecord::new(),
            resched_cost: 0,
            stats: SchedStats::new(),
        };
        main_thread.set_status(RtStatus::Admitted);
        if let Err(err) = sched.aperiodic.enqueue(main_thread) {
            log::error!("cpu {}: failed to seat main thread: {}", cpu, err);
        }
        sched
    }

    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    pub fn timing(&self) -> TimingRecord {
        self.timing
    }

    pub fn stats(&self) -> &SchedStats {
        &self.stats
    }

    pub fn current(&self) -> Option<&Arc<RtThread>> {
        self.current.as_ref()
    }

    /// Install the thread the context switcher has put on the CPU.
    pub fn set_current(&mut self, thread: Arc<RtThread>) {
        self.current = Some(thread);
    }

    /// Feed back the measured cost of a selection pass; the next pass uses
    /// it to estimate when the chosen thread will actually begin.
    pub fn note_overhead(&mut self, cost: u64) {
        self.resched_cost = cost;
    }

    /// Place a thread into the named container.
    pub fn enqueue(&mut self, tag: ContainerTag, thread: Arc<RtThread>) -> SchedResult<()> {
        match tag {
            ContainerTag::Runnable => self.runnable.enqueue(thread),
            ContainerTag::Pending => self.pending.enqueue(thread),
            ContainerTag::Aperiodic => self.aperiodic.enqueue(thread),
            ContainerTag::Arrival => self.arrival.enqueue(thread),
            ContainerTag::Waiting => self.waiting.enqueue(thread),
            ContainerTag::Sleeping => self.sleeping.enqueue(thread),
            ContainerTag::Exited => self.exited.enqueue(thread),
        }
    }

    /// Pop the next live thread from the named container.
    pub fn dequeue(&mut self, tag: ContainerTag) -> SchedResult<Arc<RtThread>> {
        match tag {
            ContainerTag::Runnable => self.runnable.dequeue(),
            ContainerTag::Pending => self.pending.dequeue(),
            ContainerTag::Aperiodic => self.aperiodic.dequeue(),
            ContainerTag::Arrival => self.arrival.dequeue(),
            ContainerTag::Waiting => self.waiting.dequeue(),
            ContainerTag::Sleeping => self.sleeping.dequeue(),
            ContainerTag::Exited => self.exited.dequeue(),
        }
    }

    /// Extract a thread from whichever container its tag names.
    pub fn remove(&mut self, thread: &Arc<RtThread>) -> SchedResult<Arc<RtThread>> {
        self.remove_from(thread.container(), thread)
    }

    pub(crate) fn remove_from(
        &mut self,
        tag: ContainerTag,
        thread: &Arc<RtThread>,
    ) -> SchedResult<Arc<RtThread>> {
        match tag {
            ContainerTag::Runnable => self.runnable.remove(thread),
            ContainerTag::Pending => self.pending.remove(thread),
            ContainerTag::Aperiodic => self.aperiodic.remove(thread),
            ContainerTag::Arrival => self.arrival.remove(thread),
            ContainerTag::Waiting => self.waiting.remove(thread),
            ContainerTag::Sleeping => self.sleeping.remove(thread),
            ContainerTag::Exited => self.exited.remove(thread),
        }
    }

    /// Tombstone a thread and queue it for reclamation. The storage is
    /// freed by housekeeping once every container reference is gone.
    ///
    /// The container the thread occupied is recorded before the exited
    /// enqueue rewrites its tag, so housekeeping can purge the stale copy
    /// later. The running thread occupies no container slot.
    pub fn thread_exit(&mut self, thread: &Arc<RtThread>) {
        let is_current = self
            .current
            .as_ref()
            .map(|c| Arc::ptr_eq(c, thread))
            .unwrap_or(false);
        thread.note_exited_from(if is_current {
            ContainerTag::Exited
        } else {
            thread.container()
        });
        thread.set_status(RtStatus::TobeRemoved);
        if is_current {
            self.current = None;
        }
        if let Err(err) = self.exited.enqueue(thread.clone()) {
            log::error!("cpu {}: exited enqueue failed: {}", self.cpu, err);
        }
    }

    /// Park a thread on the sleeping queue.
    pub fn thread_sleep(&mut self, thread: &Arc<RtThread>) {
        self.park(thread, ContainerTag::Sleeping);
    }

    /// Park a thread on the waiting queue.
    pub fn thread_wait(&mut self, thread: &Arc<RtThread>) {
        self.park(thread, ContainerTag::Waiting);
    }

    fn park(&mut self, thread: &Arc<RtThread>, tag: ContainerTag) {
        if self
            .current
            .as_ref()
            .map(|c| Arc::ptr_eq(c, thread))
            .unwrap_or(false)
        {
            // The running thread holds no container slot; just drop it
            // from the dispatch path.
            self.current = None;
        } else if let Err(err) = self.remove(thread) {
            log::debug!("cpu {}: park: {}", self.cpu, err);
        }
        if let Err(err) = self.enqueue(tag, thread.clone()) {
            log::error!("cpu {}: park enqueue failed: {}", self.cpu, err);
        }
    }

    /// Bring a parked thread back into rotation.
    pub fn thread_wake(&mut self, thread: &Arc<RtThread>) -> SchedResult<()> {
        let woken = self.remove(thread)?;
        woken.set_status(RtStatus::Admitted);
        match woken.kind() {
            RtKind::Aperiodic => self.aperiodic.enqueue(woken),
            _ => self.runnable.enqueue(woken),
        }
    }

    /// Selection engine. `now` comes from the platform cycle counter; the
    /// returned descriptor is handed to the context switcher.
    pub fn need_resched_at(&mut self, now: u64) -> Arc<RtThread> {
        let end_time = now + self.resched_cost;

        self.release_due(end_time);

        let prev = self.current.as_ref().map(Arc::as_ptr);
        let chosen = match self.current.take() {
            None => self.pick_next(),
            Some(c) => self.dispatch(c, end_time),
        };

        let pending_min = self.pending.peek().map(|t| t.deadline());
        let interval = oneshot_interval(pending_min, &chosen, end_time, 0);
        self.timing = TimingRecord {
            start_time: now,
            end_time,
            set_time: interval,
        };

        if prev != Some(Arc::as_ptr(&chosen)) {
            self.stats.record_switch();
        }
        chosen.set_status(RtStatus::Running);
        self.current = Some(chosen.clone());
        chosen
    }

    /// Move every pending periodic thread whose activation falls before
    /// `end_time` onto the runnable heap with a fresh deadline.
    fn release_due(&mut self, end_time: u64) {
        loop {
            let due = self
                .pending
                .peek()
                .map(|t| t.deadline() < end_time)
                .unwrap_or(false);
            if !due {
                break;
            }
            let released = match self.pending.dequeue() {
                Ok(t) => t,
                Err(_) => break,
            };
            if released.deadline() >= end_time {
                // Tombstones at the root made the peek stale.
                if let Err(err) = self.pending.enqueue(released) {
                    log::error!("cpu {}: pending re-enqueue failed: {}", self.cpu, err);
                }
                break;
            }
            released.release(end_time);
            self.stats.record_release();
            if let Err(err) = self.runnable.enqueue(released) {
                log::error!("cpu {}: dropped periodic release: {}", self.cpu, err);
            }
        }
    }

    fn dispatch(&mut self, c: Arc<RtThread>, end_time: u64) -> Arc<RtThread> {
        match c.kind() {
            RtKind::Aperiodic => {
                c.age_priority();
                if let Err(err) = self.aperiodic.enqueue(c) {
                    log::error!("cpu {}: aperiodic re-enqueue failed: {}", self.cpu, err);
                }
                self.pick_next()
            }
            RtKind::Sporadic => {
                let work = match c.constraints() {
                    Constraints::Sporadic { work } => *work,
                    _ => 0,
                };
                if c.run_time() >= work {
                    // Budget spent; the thread leaves the rotation.
                    self.observe_deadline(&c);
                    self.pick_next()
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
                    if self.observe_deadline(&c) {
                        // Already late: re-release immediately instead of
                        // parking it behind a deadline that has passed.
                        c.release(end_time);
                        self.stats.record_release();
                        if let Err(err) = self.runnable.enqueue(c) {
                            log::error!("cpu {}: late re-release failed: {}", self.cpu, err);
                        }
                    } else if let Err(err) = self.pending.enqueue(c) {
                        log::error!("cpu {}: pending enqueue failed: {}", self.cpu, err);
                    }
                    self.pick_next()
                } else {
                    self.continue_or_preempt(c)
                }
            }
        }
    }

    /// EDF preemption: the running real-time thread keeps the CPU unless
    /// the runnable heap holds an earlier deadline.
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
                    if let Err(err) = self.runnable.enqueue(next) {
                        log::error!("cpu {}: runnable re-enqueue failed: {}", self.cpu, err);
                    }
                    return c;
                }
                if let Err(err) = self.runnable.enqueue(c) {
                    log::error!("cpu {}: preempted thread lost: {}", self.cpu, err);
                }
                self.stats.record_preemption();
                return next;
            }
        }
        c
    }

    fn pick_next(&mut self) -> Arc<RtThread> {
        if !self.runnable.is_empty() {
            if let Ok(next) = self.runnable.dequeue() {
                return next;
            }
        }
        match self.aperiodic.dequeue() {
            Ok(next) => next,
            Err(_) => panic!(
                "cpu {}: aperiodic queue empty, no resident thread left to run",
                self.cpu
            ),
        }
    }

    fn observe_deadline(&self, thread: &Arc<RtThread>) -> bool {
        if thread.missed_deadline() {
            let err = SchedError::DeadlineMiss {
                deadline: thread.deadline(),
                observed: thread.exit_time(),
            };
            log::error!("cpu {}: {} [{}]", self.cpu, err, thread);
            self.stats.record_deadline_miss();
            true
        } else {
            false
        }
    }

    pub(crate) fn runnable_heap(&self) -> &ThreadHeap {
        &self.runnable
    }

    pub(crate) fn pending_heap(&self) -> &ThreadHeap {
        &self.pending
    }

    pub(crate) fn aperiodic_heap(&self) -> &ThreadHeap {
        &self.aperiodic
    }

    pub(crate) fn arrival_ring(&mut self) -> &mut ThreadRing {
        &mut self.arrival
    }

    pub(crate) fn exited_ring(&mut self) -> &mut ThreadRing {
        &mut self.exited
    }

    pub(crate) fn place_admitted(&mut self, thread: Arc<RtThread>) -> SchedResult<()> {
        thread.set_status(RtStatus::Admitted);
        match thread.kind() {
            RtKind::Aperiodic => self.aperiodic.enqueue(thread),
            _ => self.runnable.enqueue(thread),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::HostHandle;
    use alloc::vec::Vec;

    fn aperiodic(priority: u64) -> Arc<RtThread> {
        RtThread::new(Constraints::aperiodic(priority), 0, 0, HostHandle(priority)).unwrap()
    }

    fn periodic(period: u64, slice: u64, deadline: u64) -> Arc<RtThread> {
        let t = RtThread::new(Constraints::periodic(period, slice), 0, 0, HostHandle(deadline))
            .unwrap();
        t.set_deadline(deadline);
        t
    }

    fn sched_with_main() -> RtScheduler {
        RtScheduler::new(0, aperiodic(0))
    }

    #[test]
    fn edf_picks_the_earliest_deadline() {
        let mut sched = sched_with_main();
        let a = periodic(1000, 100, 500);
        let b = periodic(2000, 100, 300);
        sched.enqueue(ContainerTag::Runnable, a.clone()).unwrap();
        sched.enqueue(ContainerTag::Runnable, b.clone()).unwrap();
        sched.set_current(aperiodic(1));

        let chosen = sched.need_resched_at(0);
        assert!(Arc::ptr_eq(&chosen, &b));
        assert_eq!(chosen.status(), RtStatus::Running);
    }

    #[test]
    fn exhausted_slice_parks_the_thread_on_pending() {
        let mut sched = sched_with_main();
        let c = periodic(1000, 100, 500);
        c.set_run_time(100);
        c.set_exit_time(450);
        sched.set_current(c.clone());

        let chosen = sched.need_resched_at(450);
        assert_eq!(c.container(), ContainerTag::Pending);
        assert_eq!(c.deadline(), 500);
        assert_eq!(sched.stats().snapshot().deadline_misses, 0);
        // Nothing runnable, so the aperiodic main thread takes over.
        assert_eq!(chosen.kind(), RtKind::Aperiodic);
    }

    #[test]
    fn missed_deadline_re_releases_immediately() {
        let mut sched = sched_with_main();
        let c = periodic(1000, 100, 500);
        c.set_run_time(100);
        c.set_exit_time(600);
        let d = periodic(5000, 100, 800);
        sched.enqueue(ContainerTag::Runnable, d.clone()).unwrap();
        sched.set_current(c.clone());

        let chosen = sched.need_resched_at(600);
        assert!(Arc::ptr_eq(&chosen, &d));
        assert_eq!(c.deadline(), 1600);
        assert_eq!(c.run_time(), 0);
        assert_eq!(c.container(), ContainerTag::Runnable);
        assert_eq!(sched.stats().snapshot().deadline_misses, 1);
    }

    #[test]
    fn aperiodic_priority_ages_with_run_time() {
        let y = aperiodic(5);
        let mut sched = RtScheduler::new(0, y.clone());
        let x = aperiodic(5);
        x.set_run_time(10);
        sched.set_current(x.clone());

        // X aged to priority 10, so Y (still 5) wins.
        let chosen = sched.need_resched_at(0);
        assert!(Arc::ptr_eq(&chosen, &y));
        assert_eq!(x.priority(), 10);

        // Y ran 3 ticks: aged to 3, still ahead of X at 10.
        y.set_run_time(3);
        let chosen = sched.need_resched_at(10);
        assert!(Arc::ptr_eq(&chosen, &y));
        assert_eq!(y.priority(), 3);
    }

    #[test]
    fn due_pending_release_moves_to_runnable_with_fresh_deadline() {
        let mut sched = sched_with_main();
        let p = periodic(1000, 100, 900);
        sched.enqueue(ContainerTag::Pending, p.clone()).unwrap();

        let chosen = sched.need_resched_at(1000);
        assert!(Arc::ptr_eq(&chosen, &p));
        assert_eq!(p.deadline(), 2000);
        assert_eq!(p.run_time(), 0);
        assert_eq!(sched.stats().snapshot().releases, 1);
    }

    #[test]
    fn pending_release_waits_for_its_activation() {
        let mut sched = sched_with_main();
        let p = periodic(1000, 100, 900);
        sched.enqueue(ContainerTag::Pending, p.clone()).unwrap();

        let chosen = sched.need_resched_at(200);
        assert_eq!(p.container(), ContainerTag::Pending);
        assert_eq!(p.deadline(), 900);
        assert_eq!(chosen.kind(), RtKind::Aperiodic);
        // The timer is armed to fire at the pending release.
        assert_eq!(sched.timing().set_time, 700);
    }

    #[test]
    fn sporadic_keeps_cpu_until_an_earlier_deadline_shows_up() {
        let mut sched = sched_with_main();
        let c = RtThread::new(Constraints::sporadic(500), 1000, 0, HostHandle(1)).unwrap();
        c.set_run_time(100);
        sched.set_current(c.clone());

        // Later-deadline runnable thread does not preempt.
        let later = periodic(5000, 100, 2000);
        sched.enqueue(ContainerTag::Runnable, later.clone()).unwrap();
        let chosen = sched.need_resched_at(100);
        assert!(Arc::ptr_eq(&chosen, &c));

        // Earlier-deadline thread does.
        let earlier = periodic(5000, 100, 400);
        sched.enqueue(ContainerTag::Runnable, earlier.clone()).unwrap();
        let chosen = sched.need_resched_at(200);
        assert!(Arc::ptr_eq(&chosen, &earlier));
        assert_eq!(c.container(), ContainerTag::Runnable);
        assert_eq!(sched.stats().snapshot().preemptions, 1);
    }

    #[test]
    fn stale_tombstone_at_the_root_does_not_force_preemption() {
        let mut sched = sched_with_main();
        let c = periodic(1000, 100, 1000);
        c.set_run_time(10);
        sched.set_current(c.clone());

        // A tombstoned root with an artificially early deadline must not
        // trigger a preemption by the later-deadline thread behind it.
        let doomed = periodic(1000, 100, 100);
        let live = periodic(5000, 100, 2000);
        sched.enqueue(ContainerTag::Runnable, doomed.clone()).unwrap();
        sched.enqueue(ContainerTag::Runnable, live.clone()).unwrap();
        doomed.set_status(RtStatus::TobeRemoved);

        let chosen = sched.need_resched_at(10);
        assert!(Arc::ptr_eq(&chosen, &c));
        assert_eq!(doomed.status(), RtStatus::Removed);
        assert_eq!(sched.runnable_heap().len(), 1);
        assert_eq!(sched.stats().snapshot().preemptions, 0);
    }

    #[test]
    fn spent_sporadic_leaves_the_rotation() {
        let mut sched = sched_with_main();
        let c = RtThread::new(Constraints::sporadic(100), 1000, 0, HostHandle(1)).unwrap();
        c.set_run_time(100);
        c.set_exit_time(500);
        sched.set_current(c.clone());

        let chosen = sched.need_resched_at(500);
        assert_eq!(chosen.kind(), RtKind::Aperiodic);
        // Not re-enqueued anywhere the scheduler owns.
        assert!(sched.runnable_heap().is_empty());
        assert!(sched.pending_heap().is_empty());
    }

    #[test]
    #[should_panic]
    fn empty_aperiodic_heap_is_fatal() {
        let mut sched = sched_with_main();
        // Tear out the resident thread, then force a pick.
        sched.dequeue(ContainerTag::Aperiodic).unwrap();
        sched.need_resched_at(0);
    }

    #[test]
    fn exit_tombstones_and_queues_for_reclamation() {
        let mut sched = sched_with_main();
        let t = aperiodic(3);
        sched.set_current(t.clone());
        sched.thread_exit(&t);

        assert!(t.is_tombstoned());
        assert_eq!(t.container(), ContainerTag::Exited);
        assert!(sched.current().is_none());
    }

    #[test]
    fn sleep_and_wake_move_between_containers() {
        let mut sched = sched_with_main();
        let t = periodic(1000, 100, 700);
        sched.enqueue(ContainerTag::Runnable, t.clone()).unwrap();

        sched.thread_sleep(&t);
        assert_eq!(t.container(), ContainerTag::Sleeping);
        assert_eq!(t.status(), RtStatus::Sleeping);
        assert!(sched.runnable_heap().is_empty());

        sched.thread_wake(&t).unwrap();
        assert_eq!(t.container(), ContainerTag::Runnable);
        assert_eq!(t.status(), RtStatus::Admitted);
    }

    #[test]
    fn every_live_thread_sits_in_exactly_one_container() {
        let mut sched = sched_with_main();
        let threads = [
            periodic(1000, 100, 500),
            periodic(2000, 200, 900),
            aperiodic(4),
        ];
        sched
            .enqueue(ContainerTag::Runnable, threads[0].clone())
            .unwrap();
        sched
            .enqueue(ContainerTag::Pending, threads[1].clone())
            .unwrap();
        sched
            .enqueue(ContainerTag::Aperiodic, threads[2].clone())
            .unwrap();
        sched.need_resched_at(0);

        let mut seen: Vec<*const RtThread> = Vec::new();
        let mut visit = |tag: ContainerTag, t: &Arc<RtThread>| {
            if t.is_defunct() {
                return;
            }
            let ptr = Arc::as_ptr(t);
            assert!(!seen.contains(&ptr), "thread present in two containers");
            assert_eq!(t.container(), tag, "tag mismatch for {}", t);
            seen.push(ptr);
        };
        for t in sched.runnable_heap().iter() {
            visit(ContainerTag::Runnable, t);
        }
        for t in sched.pending_heap().iter() {
            visit(ContainerTag::Pending, t);
        }
        for t in sched.aperiodic_heap().iter() {
            visit(ContainerTag::Aperiodic, t);
        }
    }
}

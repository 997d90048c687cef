//! Housekeeping: arrival admission and exited-thread reclamation.
//!
//! Housekeeping runs as an ordinary periodic thread on the CPU it serves.
//! Its host body calls `housekeep_at` once per activation; the slice and
//! period chosen at `start_housekeeping` bound how much arrival latency a
//! new thread can see. It never blocks; it only drains queues and sleeps
//! by exhausting its periodic slice.

use alloc::sync::Arc;

use crate::error::SchedResult;
use crate::sched::scheduler::RtScheduler;
use crate::thread::{Constraints, ContainerTag, HostHandle, RtStatus, RtThread};

impl RtScheduler {
    /// One housekeeping iteration at time `now`.
    ///
    /// Admits at most one arrival per iteration so a burst of arrivals
    /// cannot starve the reclamation half, then purges everything on the
    /// exited queue.
    pub fn housekeep_at(&mut self, now: u64) {
        if let Ok(thread) = self.arrival_ring().dequeue() {
            if self.admit_at(&thread, now) {
                log::debug!("cpu {}: admitted {}", self.cpu(), thread);
                if let Err(err) = self.place_admitted(thread) {
                    log::error!("cpu {}: admitted thread dropped: {}", self.cpu(), err);
                }
            } else {
                log::warn!("cpu {}: rejected {}", self.cpu(), thread);
                // Dropping the last reference frees the descriptor.
            }
        }

        while let Some(thread) = self.exited_ring().drain() {
            // A tombstoned thread may still occupy a slot in the container
            // it sat in when it exited; purge that copy before finalizing.
            // A lazy pop may have discarded it already, so a miss here is
            // ordinary.
            let stale = thread.exited_from();
            if stale != ContainerTag::Exited {
                if let Err(err) = self.remove_from(stale, &thread) {
                    log::debug!("cpu {}: reclaim: {}", self.cpu(), err);
                }
            }
            thread.finalize_removed();
            self.stats().record_reclaimed();
        }
    }

    /// Create the housekeeping thread itself: a pre-admitted periodic
    /// thread with the given slice and period, seated runnable.
    pub fn start_housekeeping(
        &mut self,
        slice: u64,
        period: u64,
        now: u64,
        host: HostHandle,
    ) -> SchedResult<Arc<RtThread>> {
        let thread = RtThread::new(Constraints::periodic(period, slice), 0, now, host)?;
        thread.set_status(RtStatus::Admitted);
        self.enqueue(ContainerTag::Runnable, thread.clone())?;
        log::info!(
            "cpu {}: housekeeping started, slice {} period {}",
            self.cpu(),
            slice,
            period
        );
        Ok(thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_QUEUE;
    use crate::thread::RtKind;

    fn aperiodic(priority: u64) -> Arc<RtThread> {
        RtThread::new(Constraints::aperiodic(priority), 0, 0, HostHandle(priority)).unwrap()
    }

    fn periodic(period: u64, slice: u64) -> Arc<RtThread> {
        RtThread::new(Constraints::periodic(period, slice), 0, 0, HostHandle(period)).unwrap()
    }

    #[test]
    fn arrival_is_admitted_onto_the_runnable_heap() {
        let mut sched = RtScheduler::new(0, aperiodic(0));
        let t = periodic(1000, 100);
        sched.enqueue(ContainerTag::Arrival, t.clone()).unwrap();
        assert_eq!(t.status(), RtStatus::Arrived);

        sched.housekeep_at(0);
        assert_eq!(t.status(), RtStatus::Admitted);
        assert_eq!(t.container(), ContainerTag::Runnable);
        assert_eq!(sched.stats().snapshot().admitted, 1);
    }

    #[test]
    fn aperiodic_arrival_lands_on_the_aperiodic_heap() {
        let mut sched = RtScheduler::new(0, aperiodic(0));
        let t = aperiodic(7);
        sched.enqueue(ContainerTag::Arrival, t.clone()).unwrap();

        sched.housekeep_at(0);
        assert_eq!(t.container(), ContainerTag::Aperiodic);
        assert_eq!(sched.aperiodic_heap().len(), 2);
    }

    #[test]
    fn one_arrival_per_iteration() {
        let mut sched = RtScheduler::new(0, aperiodic(0));
        sched
            .enqueue(ContainerTag::Arrival, periodic(1000, 10))
            .unwrap();
        sched
            .enqueue(ContainerTag::Arrival, periodic(1000, 10))
            .unwrap();

        sched.housekeep_at(0);
        assert_eq!(sched.runnable_heap().len(), 1);
        sched.housekeep_at(0);
        assert_eq!(sched.runnable_heap().len(), 2);
    }

    #[test]
    fn rejected_arrival_is_dropped() {
        let mut sched = RtScheduler::new(0, aperiodic(0));
        // Saturate the periodic budget, then offer one more.
        sched
            .enqueue(ContainerTag::Runnable, periodic(1000, 650))
            .unwrap();
        let doomed = periodic(1000, 200);
        sched.enqueue(ContainerTag::Arrival, doomed.clone()).unwrap();

        sched.housekeep_at(0);
        assert_eq!(sched.stats().snapshot().denied, 1);
        assert!(sched.runnable_heap().len() == 1);
        // Only the test's handle keeps the descriptor alive now.
        assert_eq!(Arc::strong_count(&doomed), 1);
    }

    #[test]
    fn exited_threads_are_purged_from_their_last_container() {
        let mut sched = RtScheduler::new(0, aperiodic(0));
        let t = periodic(1000, 100);
        sched.enqueue(ContainerTag::Runnable, t.clone()).unwrap();

        // Exit while a stale copy still sits on the runnable heap. The
        // exited enqueue rewrites the live tag, but the pre-exit
        // container was recorded for the purge.
        sched.thread_exit(&t);
        assert_eq!(t.container(), ContainerTag::Exited);
        assert_eq!(sched.runnable_heap().len(), 1);

        sched.housekeep_at(0);
        assert_eq!(t.status(), RtStatus::Removed);
        assert!(sched.runnable_heap().is_empty());
        assert_eq!(sched.stats().snapshot().reclaimed, 1);
        assert_eq!(Arc::strong_count(&t), 1);
    }

    #[test]
    fn exiting_the_running_thread_purges_nothing() {
        let mut sched = RtScheduler::new(0, aperiodic(0));
        let t = aperiodic(3);
        sched.set_current(t.clone());

        sched.thread_exit(&t);
        sched.housekeep_at(0);
        assert_eq!(t.status(), RtStatus::Removed);
        assert_eq!(sched.stats().snapshot().reclaimed, 1);
        assert_eq!(Arc::strong_count(&t), 1);
    }

    #[test]
    fn full_arrival_queue_rejects_the_overflow() {
        let mut sched = RtScheduler::new(0, aperiodic(0));
        for i in 0..MAX_QUEUE as u64 {
            sched
                .enqueue(ContainerTag::Arrival, aperiodic(i))
                .unwrap();
        }
        assert!(sched.enqueue(ContainerTag::Arrival, aperiodic(999)).is_err());
    }

    #[test]
    fn housekeeping_thread_is_periodic_and_pre_admitted() {
        let mut sched = RtScheduler::new(0, aperiodic(0));
        let hk = sched
            .start_housekeeping(10_000, 1_000_000, 0, HostHandle(42))
            .unwrap();
        assert_eq!(hk.kind(), RtKind::Periodic);
        assert_eq!(hk.status(), RtStatus::Admitted);
        assert_eq!(hk.container(), ContainerTag::Runnable);
        assert_eq!(sched.stats().snapshot().admitted, 0);
    }
}

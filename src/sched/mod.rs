//! Scheduling subsystem.
//!
//! One `RtScheduler` per CPU, held in a global table indexed by CPU id.
//! Each instance is owned by its CPU: only that CPU's timer ISR and its
//! currently running thread ever reach it, so the per-slot lock is
//! uncontended in normal operation and exists to keep the table safe
//! during bring-up and diagnostics.
//!
//! The free functions below are the surface the ISR and thread glue call;
//! they read the clock and CPU id from the registered platform and forward
//! to the calling CPU's scheduler.

mod admission;
mod housekeeping;
mod scheduler;
mod simulator;
mod stats;

pub use scheduler::RtScheduler;
pub use simulator::{Replay, Simulator};
pub use stats::{SchedStats, StatsSnapshot};

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::{Mutex, RwLock};

use crate::error::{SchedError, SchedResult};
use crate::platform::platform;
use crate::thread::{Constraints, ContainerTag, HostHandle, RtThread};

static PER_CPU: RwLock<Vec<Mutex<RtScheduler>>> = RwLock::new(Vec::new());

/// Create and register the scheduler for the next CPU, seating
/// `main_thread` as its resident aperiodic thread. CPUs must register in
/// id order during boot; the assigned id is returned.
pub fn init_scheduler(main_thread: Arc<RtThread>) -> u32 {
    let mut table = PER_CPU.write();
    let cpu = table.len() as u32;
    table.push(Mutex::new(RtScheduler::new(cpu, main_thread)));
    log::info!("cpu {}: scheduler initialized", cpu);
    cpu
}

/// Run `f` against the scheduler owned by `cpu`.
pub fn with_scheduler<R>(cpu: u32, f: impl FnOnce(&mut RtScheduler) -> R) -> Option<R> {
    let table = PER_CPU.read();
    let slot = table.get(cpu as usize)?;
    let mut sched = slot.lock();
    Some(f(&mut sched))
}

/// ISR entry point: run the selection engine on the calling CPU, arm its
/// one-shot timer, and hand back the thread to switch to.
///
/// Returns `None` only if no scheduler was registered for this CPU.
pub fn need_resched() -> Option<Arc<RtThread>> {
    let platform = platform();
    let cpu = platform.cpu_id();
    with_scheduler(cpu, |sched| {
        let entered = platform.now();
        let chosen = sched.need_resched_at(entered);
        sched.note_overhead(platform.now().saturating_sub(entered));
        platform.set_oneshot(cpu, sched.timing().set_time);
        chosen
    })
}

/// Create a descriptor stamped with the platform clock, ready for
/// `submit`.
pub fn init_thread(
    constraints: Constraints,
    relative_deadline: u64,
    host: HostHandle,
) -> SchedResult<Arc<RtThread>> {
    RtThread::new(constraints, relative_deadline, platform().now(), host)
}

/// Hand a new thread to the calling CPU's arrival queue. Admission
/// happens later, from housekeeping.
pub fn submit(thread: Arc<RtThread>) -> SchedResult<()> {
    let cpu = platform().cpu_id();
    with_scheduler(cpu, |sched| sched.enqueue(ContainerTag::Arrival, thread))
        .unwrap_or(Err(SchedError::NotInitialized { cpu }))
}

/// Admission test against the calling CPU at the platform clock.
pub fn admit(thread: &Arc<RtThread>) -> bool {
    let platform = platform();
    with_scheduler(platform.cpu_id(), |sched| sched.admit_at(thread, platform.now()))
        .unwrap_or(false)
}

/// One housekeeping pass on the calling CPU.
pub fn housekeep() {
    let platform = platform();
    let cpu = platform.cpu_id();
    if with_scheduler(cpu, |sched| sched.housekeep_at(platform.now())).is_none() {
        log::error!("cpu {}: housekeep with no scheduler", cpu);
    }
}

/// Launch the housekeeping thread on the calling CPU.
pub fn start(slice: u64, period: u64, host: HostHandle) -> SchedResult<Arc<RtThread>> {
    let platform = platform();
    let cpu = platform.cpu_id();
    with_scheduler(cpu, |sched| {
        sched.start_housekeeping(slice, period, platform.now(), host)
    })
    .unwrap_or(Err(SchedError::NotInitialized { cpu }))
}

/// Tombstone a thread on the calling CPU and defer its reclamation to
/// housekeeping.
pub fn thread_exit(thread: &Arc<RtThread>) {
    let cpu = platform().cpu_id();
    if with_scheduler(cpu, |sched| sched.thread_exit(thread)).is_none() {
        log::error!("cpu {}: thread_exit with no scheduler", cpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{register, Platform};
    use crate::thread::{RtKind, RtStatus};
    use core::sync::atomic::{AtomicU64, Ordering};

    struct MockPlatform {
        clock: AtomicU64,
        armed: AtomicU64,
    }

    impl Platform for MockPlatform {
        fn now(&self) -> u64 {
            self.clock.load(Ordering::Acquire)
        }

        fn set_oneshot(&self, _cpu: u32, ticks: u64) {
            self.armed.store(ticks, Ordering::Release);
        }

        fn cpu_id(&self) -> u32 {
            0
        }
    }

    static MOCK: MockPlatform = MockPlatform {
        clock: AtomicU64::new(0),
        armed: AtomicU64::new(0),
    };

    // The per-CPU table and the platform registration are process-global,
    // so the whole ISR surface is exercised by this single sequential
    // test.
    #[test]
    fn isr_surface_end_to_end() {
        register(&MOCK);

        let main = RtThread::new(Constraints::aperiodic(0), 0, 0, HostHandle(0)).unwrap();
        let cpu = init_scheduler(main);
        assert_eq!(cpu, 0);

        // Boot the housekeeping thread and submit a periodic worker.
        let hk = start(10_000, 1_000_000, HostHandle(1)).unwrap();
        assert_eq!(hk.kind(), RtKind::Periodic);

        MOCK.clock.store(100, Ordering::Release);
        let worker = init_thread(Constraints::periodic(1_000_000, 50_000), 0, HostHandle(2))
            .unwrap();
        assert_eq!(worker.deadline(), 1_000_100);
        submit(worker.clone()).unwrap();
        assert_eq!(worker.container(), ContainerTag::Arrival);

        housekeep();
        assert_eq!(worker.status(), RtStatus::Admitted);
        assert_eq!(worker.container(), ContainerTag::Runnable);

        // First tick: EDF picks the housekeeping thread (earlier
        // deadline) and arms the timer with its remaining slice.
        MOCK.clock.store(200, Ordering::Release);
        let chosen = need_resched().unwrap();
        assert!(Arc::ptr_eq(&chosen, &hk));
        assert_eq!(MOCK.armed.load(Ordering::Acquire), 10_000);

        // The worker exits; housekeeping reclaims it.
        thread_exit(&worker);
        assert!(worker.is_tombstoned());
        housekeep();
        assert_eq!(worker.status(), RtStatus::Removed);

        let snapshot = with_scheduler(0, |sched| sched.stats().snapshot()).unwrap();
        assert_eq!(snapshot.admitted, 1);
        assert_eq!(snapshot.reclaimed, 1);
    }
}

//! Real-time thread descriptors.
//!
//! A descriptor is the scheduler's view of a kernel thread: its class and
//! constraints, its lifecycle status, the container currently holding it,
//! and the timing counters the dispatch cycle maintains. Descriptors are
//! shared between containers, the ISR path, and the host kernel via `Arc`,
//! so every mutable field is an atomic.

mod constraints;
mod state;

pub use constraints::{Constraints, RtKind};
pub use state::{AtomicStatus, AtomicTag, ContainerTag, RtStatus};

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::SchedResult;

/// Opaque back-link to the kernel thread a descriptor schedules.
///
/// The context-switch primitive resolves this to its own thread object;
/// the scheduler never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostHandle(pub u64);

/// Scheduler-side descriptor of one thread.
pub struct RtThread {
    constraints: Constraints,
    status: AtomicStatus,
    container: AtomicTag,
    start_time: AtomicU64,
    run_time: AtomicU64,
    deadline: AtomicU64,
    exit_time: AtomicU64,
    exited_from: AtomicTag,
    host: HostHandle,
}

impl RtThread {
    /// Create a descriptor in the `Arrived` state.
    ///
    /// The absolute deadline is derived from `now`: release + period for
    /// periodic threads, `now + relative_deadline` for sporadic ones.
    /// Aperiodic threads carry no deadline.
    pub fn new(
        constraints: Constraints,
        relative_deadline: u64,
        now: u64,
        host: HostHandle,
    ) -> SchedResult<Arc<Self>> {
        constraints.validate()?;

        let deadline = match &constraints {
            Constraints::Periodic { period, .. } => now + period,
            Constraints::Sporadic { .. } => now + relative_deadline,
            Constraints::Aperiodic { .. } => 0,
        };

        Ok(Arc::new(Self {
            constraints,
            status: AtomicStatus::new(RtStatus::Arrived),
            container: AtomicTag::new(ContainerTag::Arrival),
            start_time: AtomicU64::new(0),
            run_time: AtomicU64::new(0),
            deadline: AtomicU64::new(deadline),
            exit_time: AtomicU64::new(0),
            exited_from: AtomicTag::new(ContainerTag::Exited),
            host,
        }))
    }

    pub fn kind(&self) -> RtKind {
        self.constraints.kind()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn host(&self) -> HostHandle {
        self.host
    }

    pub fn status(&self) -> RtStatus {
        self.status.load()
    }

    pub fn set_status(&self, status: RtStatus) {
        self.status.store(status);
    }

    pub fn container(&self) -> ContainerTag {
        self.container.load()
    }

    pub(crate) fn set_container(&self, tag: ContainerTag) {
        self.container.store(tag);
    }

    /// Container this thread occupied when it exited. The exited-ring
    /// enqueue rewrites the live tag, so the purge in housekeeping reads
    /// this snapshot instead. `Exited` means there is nothing to purge.
    pub(crate) fn exited_from(&self) -> ContainerTag {
        self.exited_from.load()
    }

    pub(crate) fn note_exited_from(&self, tag: ContainerTag) {
        self.exited_from.store(tag);
    }

    pub fn deadline(&self) -> u64 {
        self.deadline.load(Ordering::Acquire)
    }

    pub fn set_deadline(&self, deadline: u64) {
        self.deadline.store(deadline, Ordering::Release);
    }

    pub fn run_time(&self) -> u64 {
        self.run_time.load(Ordering::Acquire)
    }

    pub fn set_run_time(&self, run_time: u64) {
        self.run_time.store(run_time, Ordering::Release);
    }

    pub fn start_time(&self) -> u64 {
        self.start_time.load(Ordering::Acquire)
    }

    pub fn exit_time(&self) -> u64 {
        self.exit_time.load(Ordering::Acquire)
    }

    pub fn set_exit_time(&self, exit_time: u64) {
        self.exit_time.store(exit_time, Ordering::Release);
    }

    /// Current aperiodic priority; 0 for real-time classes.
    pub fn priority(&self) -> u64 {
        self.constraints.priority()
    }

    /// Called by the context switcher when this thread takes the CPU.
    pub fn note_enter(&self, now: u64) {
        self.start_time.store(now, Ordering::Release);
    }

    /// Called by the context switcher when this thread leaves the CPU.
    /// Accumulates the elapsed slice into `run_time`.
    pub fn note_exit(&self, now: u64) {
        self.exit_time.store(now, Ordering::Release);
        let elapsed = now.saturating_sub(self.start_time.load(Ordering::Acquire));
        self.run_time.fetch_add(elapsed, Ordering::AcqRel);
    }

    /// Age an aperiodic thread: its priority becomes its accumulated
    /// run time, so long-served threads lose urgency.
    pub(crate) fn age_priority(&self) {
        self.constraints.set_priority(self.run_time());
    }

    /// Re-release a periodic thread at `now`: fresh deadline one period
    /// out, run time cleared. No-op for other classes.
    pub(crate) fn release(&self, now: u64) {
        if let Constraints::Periodic { period, .. } = &self.constraints {
            self.deadline.store(now + period, Ordering::Release);
            self.run_time.store(0, Ordering::Release);
        }
    }

    /// Whether this thread last left the CPU after its deadline.
    pub fn missed_deadline(&self) -> bool {
        self.exit_time() > self.deadline()
    }

    pub fn is_tombstoned(&self) -> bool {
        self.status.load() == RtStatus::TobeRemoved
    }

    /// Tombstoned or already finalized: either way the descriptor must
    /// never be handed out by a container again.
    pub fn is_defunct(&self) -> bool {
        matches!(
            self.status.load(),
            RtStatus::TobeRemoved | RtStatus::Removed
        )
    }

    /// Finalize a tombstone so its storage can be reclaimed.
    pub(crate) fn finalize_removed(&self) {
        self.status.store(RtStatus::Removed);
    }

    /// Detached copy for the admission simulator: same class, constraints,
    /// and counters, sharing nothing mutable with this descriptor.
    pub(crate) fn clone_detached(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            constraints: self.constraints.clone(),
            status: AtomicStatus::new(self.status()),
            container: AtomicTag::new(self.container()),
            start_time: AtomicU64::new(self.start_time()),
            run_time: AtomicU64::new(self.run_time()),
            deadline: AtomicU64::new(self.deadline()),
            exit_time: AtomicU64::new(self.exit_time()),
            exited_from: AtomicTag::new(self.exited_from()),
            host: self.host,
        })
    }
}

impl fmt::Display for RtThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} thread (host {:#x}): status={} start={} run={} exit={} deadline={}",
            self.kind(),
            self.host.0,
            self.status(),
            self.start_time(),
            self.run_time(),
            self.exit_time(),
            self.deadline(),
        )
    }
}

impl fmt::Debug for RtThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtThread")
            .field("constraints", &self.constraints)
            .field("status", &self.status())
            .field("container", &self.container())
            .field("run_time", &self.run_time())
            .field("deadline", &self.deadline())
            .field("host", &self.host)
            .finish()
    }
}

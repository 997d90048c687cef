//! Per-CPU real-time scheduler core.
//!
//! Mixes three classes of work on each CPU:
//! - **Periodic** threads, which receive a compute `slice` every `period`
//!   cycles and are dispatched earliest-deadline-first;
//! - **Sporadic** threads, which run once for a `work` budget against a
//!   one-shot deadline;
//! - **Aperiodic** threads, ordered by a priority that ages with
//!   accumulated run time.
//!
//! On every timer interrupt or voluntary yield the selection engine
//! releases due periodic activations, picks the next thread, arms a single
//! one-shot hardware timer, and reports missed deadlines. A utilization
//! based admission controller, backed by a pure simulation of the
//! selection logic, decides whether a new real-time thread may join.
//!
//! The crate is freestanding: the embedding kernel registers a
//! [`platform::Platform`] for the cycle counter, the one-shot timer, and
//! CPU identity, and drives context switches with the descriptors
//! returned by [`sched::need_resched`].

#![no_std]

extern crate alloc;

pub mod config;
pub mod error;
pub mod platform;
pub mod queue;
pub mod sched;
pub mod thread;
pub mod timing;

pub use error::{SchedError, SchedResult};
pub use sched::{
    admit, housekeep, init_scheduler, init_thread, need_resched, start, submit, thread_exit,
    with_scheduler, RtScheduler, Replay, SchedStats, Simulator, StatsSnapshot,
};
pub use thread::{Constraints, ContainerTag, HostHandle, RtKind, RtStatus, RtThread};
pub use timing::TimingRecord;

//! Thread state machine.
//!
//! A descriptor carries two pieces of mutable identity: its lifecycle
//! status and the tag of the container currently holding it. Both are
//! shared with the ISR path through `Arc`, so both live in atomic cells.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle status of a real-time thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum RtStatus {
    /// Created, waiting in the arrival queue for admission.
    Arrived = 0,

    /// Accepted by the admission controller.
    Admitted = 1,

    /// Parked on the waiting queue.
    Waiting = 2,

    /// Currently on the CPU.
    Running = 3,

    /// Tombstoned: will be discarded at the next pop that sees it.
    TobeRemoved = 4,

    /// Fully purged; storage may be reclaimed.
    Removed = 5,

    /// Parked on the sleeping queue.
    Sleeping = 6,
}

impl RtStatus {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Arrived),
            1 => Some(Self::Admitted),
            2 => Some(Self::Waiting),
            3 => Some(Self::Running),
            4 => Some(Self::TobeRemoved),
            5 => Some(Self::Removed),
            6 => Some(Self::Sleeping),
            _ => None,
        }
    }
}

impl fmt::Display for RtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arrived => write!(f, "arrived"),
            Self::Admitted => write!(f, "admitted"),
            Self::Waiting => write!(f, "waiting"),
            Self::Running => write!(f, "running"),
            Self::TobeRemoved => write!(f, "tobe-removed"),
            Self::Removed => write!(f, "removed"),
            Self::Sleeping => write!(f, "sleeping"),
        }
    }
}

/// Which container a thread currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ContainerTag {
    Runnable = 0,
    Pending = 1,
    Aperiodic = 2,
    Arrival = 3,
    Waiting = 4,
    Sleeping = 5,
    Exited = 6,
}

impl ContainerTag {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Runnable),
            1 => Some(Self::Pending),
            2 => Some(Self::Aperiodic),
            3 => Some(Self::Arrival),
            4 => Some(Self::Waiting),
            5 => Some(Self::Sleeping),
            6 => Some(Self::Exited),
            _ => None,
        }
    }
}

/// Atomic cell holding an `RtStatus`.
pub struct AtomicStatus {
    inner: AtomicU64,
}

impl AtomicStatus {
    pub const fn new(status: RtStatus) -> Self {
        Self {
            inner: AtomicU64::new(status as u64),
        }
    }

    pub fn load(&self) -> RtStatus {
        RtStatus::from_u64(self.inner.load(Ordering::Acquire)).unwrap_or(RtStatus::Removed)
    }

    pub fn store(&self, status: RtStatus) {
        self.inner.store(status as u64, Ordering::Release);
    }
}

/// Atomic cell holding a `ContainerTag`.
pub struct AtomicTag {
    inner: AtomicU64,
}

impl AtomicTag {
    pub const fn new(tag: ContainerTag) -> Self {
        Self {
            inner: AtomicU64::new(tag as u64),
        }
    }

    pub fn load(&self) -> ContainerTag {
        ContainerTag::from_u64(self.inner.load(Ordering::Acquire)).unwrap_or(ContainerTag::Exited)
    }

    pub fn store(&self, tag: ContainerTag) {
        self.inner.store(tag as u64, Ordering::Release);
    }
}

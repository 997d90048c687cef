//! Scheduler error handling.
//!
//! Every fallible container and admission operation reports a typed error.
//! Errors are local by design: the scheduler logs and keeps going, and the
//! only condition that escalates past this module is an empty aperiodic
//! heap, which means the resident main thread has been lost and the
//! per-CPU state is no longer trustworthy.

use core::fmt;

use crate::thread::ContainerTag;

/// Error produced by a scheduler operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// A container is at capacity; the enqueue was dropped.
    QueueFull { container: ContainerTag, capacity: usize },

    /// A dequeue found nothing live in the container.
    QueueEmpty { container: ContainerTag },

    /// A removal scan did not find the thread in its tagged container.
    ThreadNotFound { container: ContainerTag },

    /// A periodic thread left the CPU after its deadline.
    DeadlineMiss { deadline: u64, observed: u64 },

    /// The admission test rejected a real-time thread.
    AdmissionDenied { utilization: u64, limit: u64 },

    /// Thread constraints that can never be scheduled (e.g. slice > period).
    InvalidConstraints { reason: &'static str },

    /// No scheduler has been registered for the calling CPU.
    NotInitialized { cpu: u32 },
}

impl SchedError {
    /// Whether the caller can simply continue after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::NotInitialized { .. })
    }

    /// Error severity: 0 = expected, 1 = warning, 2 = severe.
    pub fn severity(&self) -> u8 {
        match self {
            Self::QueueEmpty { .. } | Self::ThreadNotFound { .. } => 0,
            Self::AdmissionDenied { .. } | Self::InvalidConstraints { .. } => 1,
            Self::QueueFull { .. } | Self::DeadlineMiss { .. } | Self::NotInitialized { .. } => 2,
        }
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull { container, capacity } => {
                write!(f, "{:?} queue full ({} slots)", container, capacity)
            }
            Self::QueueEmpty { container } => {
                write!(f, "{:?} queue empty", container)
            }
            Self::ThreadNotFound { container } => {
                write!(f, "thread not found on {:?} queue", container)
            }
            Self::DeadlineMiss { deadline, observed } => {
                write!(
                    f,
                    "deadline {} missed by {} cycles",
                    deadline,
                    observed.saturating_sub(*deadline)
                )
            }
            Self::AdmissionDenied { utilization, limit } => {
                write!(f, "admission denied: utilization {} exceeds {}", utilization, limit)
            }
            Self::InvalidConstraints { reason } => {
                write!(f, "invalid constraints: {}", reason)
            }
            Self::NotInitialized { cpu } => {
                write!(f, "no scheduler registered for cpu {}", cpu)
            }
        }
    }
}

/// Result type for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;

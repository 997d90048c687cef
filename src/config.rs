//! Scheduler tuning constants.
//!
//! Utilization factors are expressed against a scale of 100,000, so
//! `PERIODIC_UTIL = 65_000` means the periodic task set may claim at most
//! 65% of the CPU. All durations are in cycles of the platform's monotonic
//! counter.

/// Scale applied to utilization ratios (slice/period, work/laxity).
pub const UTIL_SCALE: u64 = 100_000;

/// Utilization ceiling for the periodic task set (runnable + pending).
pub const PERIODIC_UTIL: u64 = 65_000;

/// Utilization ceiling for the sporadic task set (runnable only).
pub const SPORADIC_UTIL: u64 = 18_000;

/// Reserved for a future aperiodic bandwidth server. Unused.
pub const APERIODIC_UTIL: u64 = 9_000;

/// Default one-shot timer interval when nothing earlier constrains it.
pub const QUANTUM: u64 = 10_000_000;

/// Fixed capacity of every thread container.
pub const MAX_QUEUE: usize = 256;

/// Upper bound on selection decisions replayed per admission trial.
pub const SIM_MAX_STEPS: usize = 64;

//! External interface seam.
//!
//! The scheduler core does not touch hardware. The embedding kernel
//! supplies a monotonic cycle counter, a per-CPU one-shot timer, and the
//! identity of the calling CPU through this trait, registered once during
//! boot. Tests install a mock with a hand-cranked clock.

use spin::Once;

/// Services the embedding kernel provides to the scheduler.
pub trait Platform: Sync {
    /// Monotonic cycle counter shared by all CPUs.
    fn now(&self) -> u64;

    /// Arm `cpu`'s one-shot timer to fire `ticks` cycles from now.
    fn set_oneshot(&self, cpu: u32, ticks: u64);

    /// Identity of the calling CPU.
    fn cpu_id(&self) -> u32;
}

static PLATFORM: Once<&'static dyn Platform> = Once::new();

/// Register the platform. The first registration wins; later calls are
/// ignored.
pub fn register(platform: &'static dyn Platform) {
    PLATFORM.call_once(|| platform);
}

/// The registered platform, if any.
pub fn try_platform() -> Option<&'static dyn Platform> {
    PLATFORM.get().copied()
}

/// The registered platform.
///
/// Panics when called before `register`: without a clock and a timer the
/// scheduler cannot make a single decision, so this is a boot-order bug.
pub fn platform() -> &'static dyn Platform {
    match PLATFORM.get() {
        Some(platform) => *platform,
        None => panic!("scheduler platform not registered"),
    }
}

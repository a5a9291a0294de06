//! Time representation shared by suspend/resume, periodic release, and the
//! time source.
//!
//! The pod core never reads a wall clock directly outside of [`crate::sched::timesource`]
//! and the `Arch`/`TimerWheel` collaborators — everywhere else a nanosecond
//! count is just an opaque `u64` it passes through.

/// Sentinel meaning "no timeout", "no period", or "never fired".
pub const INFINITE: u64 = u64::MAX;

/// How a deadline passed to `suspend_thread`/`set_thread_periodic` is
/// interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutMode {
    /// Nanoseconds from now.
    Relative,
    /// An absolute nanosecond timestamp on the pod's time base.
    Absolute,
}

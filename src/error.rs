//! Pod error codes
//!
//! The original nucleus returns small negative `errno`-style codes from every
//! fallible entry point. We keep the same error *vocabulary* but surface it as
//! a typed enum so callers match on it instead of comparing integers.

use core::fmt;

/// Error returned by a pod entry point.
///
/// Asynchronous wake-up outcomes (timed out, flushed, interrupted) are *not*
/// reported here — they are one-shot bits in [`crate::mask::ThreadInfo`],
/// because a single suspension call can't distinguish them after the fact any
/// other way. This enum only covers the synchronous, "did the call itself
/// succeed" outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodError {
    /// Resource exhaustion (heap/stack pool allocation failed).
    NoMem,
    /// Argument invalid for this call (bad flags, empty affinity, bad period).
    Inval,
    /// State mismatch: the call isn't valid for the target's current state.
    Busy,
    /// Capability/context violation (wrong caller context, not self, locked).
    Perm,
    /// A blocking wait's deadline elapsed.
    TimedOut,
    /// The call would need to block but the target has no means to.
    WouldBlock,
    /// A blocking wait was broken by an external unblock.
    Intr,
    /// The target identity was withdrawn while the call was in flight.
    Idrm,
    /// Duplicate registration (e.g. a hook already present).
    Exist,
    /// No such device/collaborator backend installed.
    NoDev,
    /// Operation not implemented by the installed collaborator backend.
    NoSys,
}

impl fmt::Display for PodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PodError::NoMem => "out of memory",
            PodError::Inval => "invalid argument",
            PodError::Busy => "resource busy",
            PodError::Perm => "operation not permitted",
            PodError::TimedOut => "timed out",
            PodError::WouldBlock => "operation would block",
            PodError::Intr => "interrupted",
            PodError::Idrm => "identifier removed",
            PodError::Exist => "already exists",
            PodError::NoDev => "no such device",
            PodError::NoSys => "function not implemented",
        };
        f.write_str(msg)
    }
}

/// Result alias used throughout the pod core.
pub type PodResult<T> = Result<T, PodError>;

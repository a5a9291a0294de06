//! Bit-packed state and info masks shared by the pod, scheduler slots, and
//! threads.
//!
//! Kept as named [`bitflags`] sets rather than raw integers so every call
//! site spells out which bit it means, the way the teacher crate does for
//! `Protection`/`Rights`. [`BLOCK_BITS`] stays a first-class constant because
//! `suspend_thread`/`resume_thread` predicate on "any blocking bit set" over
//! and over.

bitflags::bitflags! {
    /// A thread's current scheduling state.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ThreadState: u32 {
        /// Never started (or restarted and not yet re-started).
        const DORMANT  = 1 << 0;
        /// Explicitly suspended by `suspend_thread(SUSP, ...)`.
        const SUSP     = 1 << 1;
        /// Waiting on a timer (resume timer or periodic timer).
        const DELAY    = 1 << 2;
        /// Waiting on a wait channel (`wchan` must be non-null).
        const PEND     = 1 << 3;
        /// Enqueued in its slot's ready queue.
        const READY    = 1 << 4;
        /// This is a per-CPU root (idle) thread.
        const ROOT     = 1 << 5;
        /// Bound to a user-space mate (out of core scope; flag only).
        const SHADOW   = 1 << 6;
        /// Priority-inheritance boost currently in effect.
        const BOOST    = 1 << 7;
        /// Scheduler locked for this thread (`lock_sched`/`unlock_sched`).
        const LOCK     = 1 << 8;
        /// Round-robin policy attached (credit may still be INFINITE).
        const RRB      = 1 << 9;
        /// Thread is FPU-enabled.
        const FPU      = 1 << 10;
        /// Deleted; TCB awaits post-switch finalization.
        const ZOMBIE   = 1 << 11;
        /// `start_thread` has run at least once.
        const STARTED  = 1 << 12;
        /// Self-restart in progress; the rescheduler must re-enter via the
        /// architecture context reset rather than a normal switch.
        const RESTART  = 1 << 13;
        /// Migrated while an unlocked switch was in flight; the arriving
        /// slot must enqueue it onto its own ready queue.
        const MIGRATE  = 1 << 14;
        /// Relaxed into secondary (host) mode.
        const RELAX    = 1 << 15;
        /// Interrupt shield requested (`opt-ishield`).
        const SHIELD   = 1 << 16;
        /// Asynchronous signal delivery inhibited.
        const ASDI     = 1 << 17;
    }
}

/// Blocking bits: a thread with any of these set cannot be `READY`.
pub const BLOCK_BITS: ThreadState = ThreadState::SUSP
    .union(ThreadState::DELAY)
    .union(ThreadState::PEND)
    .union(ThreadState::DORMANT)
    .union(ThreadState::RELAX);

impl ThreadState {
    /// Whether any blocking bit is set.
    pub fn is_blocked(&self) -> bool {
        self.intersects(BLOCK_BITS)
    }
}

bitflags::bitflags! {
    /// One-shot outcomes latched by a suspend/resume/unblock sequence.
    ///
    /// Each bit is cleared by the next call that would otherwise leave it
    /// ambiguous, except `BREAK`, which is monotonic until the thread
    /// actually resumes (see `unblock_thread`).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ThreadInfo: u32 {
        /// The suspend's timeout elapsed before it was satisfied.
        const TIMEO   = 1 << 0;
        /// The wait channel the thread was pending on was removed.
        const RMID    = 1 << 1;
        /// The suspend was cancelled by `unblock_thread`.
        const BREAK   = 1 << 2;
        /// Resumed normally by an explicit grant.
        const WAKEN   = 1 << 3;
        /// Preempted off the CPU involuntarily (round-robin exhaustion etc).
        const ROBBED  = 1 << 4;
        /// A shadow mate delivered a lethal kick while runnable.
        const KICKED  = 1 << 5;
        /// `renice_thread` changed this thread's priority.
        const PRIOSET = 1 << 6;
    }
}

bitflags::bitflags! {
    /// Pod-wide status.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PodStatus: u32 {
        /// The pod has been initialized and is not mid-shutdown.
        const ACTIVE   = 1 << 0;
        /// A fatal condition has been latched; diagnostics are frozen.
        const FATAL    = 1 << 1;
        /// Teardown in progress: `Pod::init` must refuse to stack.
        const TEARDOWN = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Per-CPU scheduler slot status.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SlotStatus: u32 {
        /// A hook callout is currently running on this slot.
        const KCOUT  = 1 << 0;
        /// Mid architecture switch (`hw-unlocked-switch`): set bracketing
        /// the call into `Arch::switch_to`.
        const SWLOCK = 1 << 1;
        /// A remote-IPI reschedule request is outstanding for this slot.
        const RPICK  = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_bits_excludes_ready_and_root() {
        assert!(!BLOCK_BITS.contains(ThreadState::READY));
        assert!(!BLOCK_BITS.contains(ThreadState::ROOT));
        assert!(!BLOCK_BITS.contains(ThreadState::STARTED));
    }

    #[test]
    fn is_blocked_reflects_block_bits() {
        assert!(ThreadState::SUSP.is_blocked());
        assert!(ThreadState::DELAY.is_blocked());
        assert!(ThreadState::PEND.is_blocked());
        assert!(ThreadState::DORMANT.is_blocked());
        assert!(ThreadState::RELAX.is_blocked());
        assert!(!ThreadState::READY.is_blocked());
        assert!(!(ThreadState::READY | ThreadState::STARTED).is_blocked());
    }

    #[test]
    fn info_break_is_distinct_from_timeo() {
        let mut info = ThreadInfo::empty();
        info.insert(ThreadInfo::BREAK);
        assert!(info.contains(ThreadInfo::BREAK));
        assert!(!info.contains(ThreadInfo::TIMEO));
    }
}

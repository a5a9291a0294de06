//! Collaborator interfaces.
//!
//! The pod core treats the architecture layer, the scheduling-class policy,
//! the timer wheel, the synchronization-object layer, and the user-space
//! shadow bridge as black boxes it only calls through these traits (§6 of the
//! design doc). Concrete, hardware-backed implementations live under
//! [`crate::arch`]; a deterministic in-memory implementation used by the
//! unit/scenario tests lives under [`crate::backend::noop`].

use crate::cpu::{CpuId, CpuMask};
use crate::error::PodResult;
use crate::thread::{RegisterState, ThreadId};

/// Architecture-specific primitives the rescheduler and time source need.
///
/// Implementors must not block and must be callable with the global lock
/// held and interrupts disabled — every method here runs on the hot
/// scheduling path.
pub trait Arch: Send + Sync {
    /// Perform the actual machine-level context switch, saving `from`'s
    /// register state (if `Some`) and restoring `to`'s.
    ///
    /// # Safety
    /// `to` must be a fully initialized register state for a thread that is
    /// not currently running anywhere else.
    unsafe fn switch_to(&self, from: Option<&mut RegisterState>, to: &RegisterState);

    /// Build the initial register state for a thread whose entry point and
    /// stack have just been set up.
    fn init_thread_context(&self, entry: usize, stack_top: usize, arg: usize) -> RegisterState;

    /// Called on the new thread's welcome path when no register-level switch
    /// actually occurred (self-restart re-entry).
    fn finalize_no_switch(&self);

    /// Save the FPU state currently live in hardware into `context`.
    fn save_fpu(&self, context: &mut FpuContext);
    /// Restore `context` into hardware FPU state.
    fn restore_fpu(&self, context: &FpuContext);
    /// Enable the FPU for the current thread without restoring content
    /// (used when the incoming thread already owns the FPU on this CPU).
    fn enable_fpu(&self);
    /// Initialize a fresh FPU context to its reset state.
    fn init_fpu(&self, context: &mut FpuContext);

    /// Lowest-numbered CPU in `mask`, or `None` if `mask` is empty.
    fn first_cpu(&self, mask: CpuMask) -> Option<CpuId> {
        mask.first()
    }

    /// The CPU this call is currently executing on.
    fn current_cpu(&self) -> CpuId;

    /// Send a reschedule IPI to `cpu`.
    fn send_ipi(&self, cpu: CpuId);

    /// Start the periodic or one-shot hardware tick on the current CPU.
    /// Returns `0` for one-shot-only hardware, `1` if a relative periodic
    /// timer suffices, or the required period in nanoseconds if the
    /// hardware needs host-emulated periodic assistance.
    fn start_timer(&self, cpu: CpuId) -> PodResult<u64>;
    /// Stop the hardware tick on `cpu`.
    fn stop_timer(&self, cpu: CpuId);

    /// Wall-clock time in nanoseconds since an arbitrary but stable epoch.
    fn get_host_time(&self) -> u64;
    /// Monotonic per-CPU execution-time counter in nanoseconds.
    fn get_cpu_time(&self) -> u64;

    /// Whether the calling context is an interrupt/asynchronous context, in
    /// which `schedule()` must escalate rather than switch directly.
    fn in_interrupt_context(&self) -> bool;

    /// Latch a fatal condition and never return (panics in test backends).
    fn panic(&self, diagnostic: &str) -> !;
}

/// Opaque, architecture-sized FPU save area.
///
/// 512 bytes covers `fxsave`/legacy SSE state; architectures needing more
/// (AVX-512 `xsave` areas) would widen this, which is why it's a distinct
/// type rather than inlined into [`crate::thread::Tcb`].
#[derive(Clone, Copy)]
pub struct FpuContext(pub [u8; 512]);

impl Default for FpuContext {
    fn default() -> Self {
        FpuContext([0; 512])
    }
}

/// A per-CPU ready-queue policy.
///
/// The pod core is deliberately agnostic to how threads are ordered for
/// `pick_next` — this is the "scheduler class" the spec treats as a
/// pluggable, black-box capability.
pub trait SchedClass: Send + Sync {
    /// Insert `thread` into the ready queue.
    fn enqueue(&mut self, thread: ThreadId, priority: i32);
    /// Remove `thread` from the ready queue (idempotent if absent).
    fn dequeue(&mut self, thread: ThreadId);
    /// Pop the next thread to run, or `None` if the queue is empty.
    fn pick_next(&mut self) -> Option<ThreadId>;
    /// Re-insert `thread` to reflect an updated priority without otherwise
    /// disturbing queue order for same-priority peers.
    fn reposition(&mut self, thread: ThreadId, priority: i32) {
        self.dequeue(thread);
        self.enqueue(thread, priority);
    }
    /// Number of threads currently queued.
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The timer wheel collaborator: per-thread resume and periodic timers.
pub trait TimerWheel: Send + Sync {
    /// Arm `timer` to fire once after `delay_ns` (relative to now).
    fn start_relative(&self, timer: TimerId, delay_ns: u64);
    /// Arm `timer` to fire at absolute time `date_ns`.
    fn start_absolute(&self, timer: TimerId, date_ns: u64);
    /// Arm `timer` to fire periodically every `period_ns`, first firing
    /// after `period_ns`.
    fn start_periodic(&self, timer: TimerId, period_ns: u64);
    fn stop(&self, timer: TimerId);
    /// Whether `timer` is currently armed.
    fn is_running(&self, timer: TimerId) -> bool;
    /// Bind `timer` to fire its callback on `cpu`.
    fn set_sched(&self, timer: TimerId, cpu: CpuId);
    /// Overrun count accumulated since the last read, reset to zero by the
    /// read.
    fn get_overruns(&self, timer: TimerId) -> u64;
    /// The expected next firing date, for `wait_thread_period`'s "did we
    /// already pass it" check.
    fn pexpect(&self, timer: TimerId) -> u64;
    /// The timer's configured period, or `0` if aperiodic.
    fn interval(&self, timer: TimerId) -> u64;
}

/// Opaque timer handle allocated by the timer wheel collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

/// The wait-channel / synchronization-object layer.
pub trait Synch: Send + Sync {
    /// Detach `thread` from whatever wait channel it is recorded against,
    /// without otherwise changing its state (used when a timeout races a
    /// grant, or when a channel is withdrawn).
    fn forget_sleeper(&self, thread: ThreadId, wchan: WchanId);
    /// Release every synchronization object `thread` currently owns (mutex
    /// ownership transfer, priority deboost), called on delete/restart.
    fn release_all_ownerships(&self, thread: ThreadId);
    /// Reorder `thread` within the wait channel it is pending on to reflect
    /// a priority change, unless the channel opted out via `DREORD`.
    fn renice_sleeper(&self, thread: ThreadId, wchan: WchanId, priority: i32);
    /// Wake every thread pending on `wchan` with `RMID` latched.
    fn flush(&self, wchan: WchanId);
}

/// Opaque wait-channel handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WchanId(pub u64);

/// The user-space shadow-task bridge (`opt-pervasive`).
///
/// Out of core scope per the spec (§1); the pod core only needs to be able
/// to call these without knowing how they're implemented.
pub trait ShadowBridge: Send + Sync {
    fn shadow_start(&self, thread: ThreadId);
    fn shadow_suspend(&self, thread: ThreadId);
    fn shadow_relax(&self, thread: ThreadId);
    fn shadow_send_sig(&self, thread: ThreadId, signal: u32);
    fn shadow_exit(&self, thread: ThreadId);
    fn shadow_rpi_check(&self, thread: ThreadId) -> bool;
    fn shadow_reset_shield(&self, thread: ThreadId);
}

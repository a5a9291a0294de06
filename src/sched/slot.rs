//! Per-CPU scheduler slot (§3: "Scheduler slot").

use alloc::boxed::Box;

use crate::cpu::{CpuId, CpuMask};
use crate::mask::SlotStatus;
use crate::thread::ThreadId;
use crate::traits::{SchedClass, TimerId};

use super::class::PriorityClass;

/// The state a pod keeps for each online CPU: which thread is current, the
/// ready queue, the FPU owner, a recorded zombie awaiting finalization, and
/// the two slot-local timers (round-robin/watchdog).
pub struct SchedSlot {
    pub cpu: CpuId,
    pub curr: ThreadId,
    /// CPUs with a reschedule pending that this slot knows about: its own
    /// bit when a local reschedule is due, or a peer's bit momentarily while
    /// `poke_resched` is notifying it.
    pub resched: CpuMask,
    pub status: SlotStatus,
    /// Which thread's FPU context is currently live in hardware on this CPU,
    /// if any (§4.9: "lazy FPU ownership").
    pub fpu_holder: Option<ThreadId>,
    /// Set by `schedule()` when the thread it is switching away from is a
    /// `ZOMBIE`, and drained by that same call's epilogue once the
    /// architecture switch has happened — real hardware defers this to the
    /// next thread's welcome path since the switch doesn't return on the
    /// outgoing stack; the single-stack test/noop backend runs it inline.
    pub zombie: Option<ThreadId>,
    /// The outgoing thread during an in-flight architecture switch
    /// (`hw-unlocked-switch`): set just before `schedule_on` hands off to
    /// `Arch::switch_to` and cleared once its epilogue completes. Lets the
    /// epilogue resolve "who was I switching away from" to finish a deferred
    /// migration enqueue (§4.5, §4.8).
    pub last: Option<ThreadId>,
    /// This slot's root (idle) thread; the fallback when the ready queue is
    /// empty.
    pub rootcb: ThreadId,
    /// Round-robin credit-exhaustion timer, armed only while `curr` is
    /// `RRB` and its credit is finite.
    pub rr_timer: Option<TimerId>,
    /// Watchdog timer guarding against a non-root thread hogging the CPU
    /// with scheduling locked (`opt-watchdog`).
    pub watchdog_timer: Option<TimerId>,
    /// `Arch::get_cpu_time()` reading the last time this slot switched
    /// threads, for `exec_time_ns` accounting (`opt-stats`).
    pub last_switch_ns: u64,
    pub ready: Box<dyn SchedClass>,
}

impl SchedSlot {
    pub fn new(cpu: CpuId, rootcb: ThreadId) -> Self {
        Self {
            cpu,
            curr: rootcb,
            resched: CpuMask::EMPTY,
            status: SlotStatus::empty(),
            fpu_holder: None,
            zombie: None,
            last: None,
            rootcb,
            rr_timer: None,
            watchdog_timer: None,
            last_switch_ns: 0,
            ready: Box::new(PriorityClass::new()),
        }
    }
}

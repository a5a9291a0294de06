//! Thread Control Block
//!
//! `Tcb` is the per-thread record the rest of the pod mutates under the
//! global lock. Field shapes (register layout, accounting counters) follow
//! the teacher crate's `sched::thread::Thread`; the state/info bitmasks,
//! priority triple, and wait-channel/timer fields follow the pod spec.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::cpu::{CpuId, CpuMask};
use crate::mask::{ThreadInfo, ThreadState};
use crate::traits::{FpuContext, TimerId, WchanId};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Thread identifier, unique for the lifetime of the pod.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId {
    pub fn new() -> Self {
        Self(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

/// Saved CPU register state for context switching.
///
/// Layout is architecture-defined; the pod core only moves this around by
/// value and hands it to [`crate::traits::Arch::switch_to`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct RegisterState {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub rsp: u64,
    pub rip: u64,
    pub rflags: u64,
}

/// Execution-time and context-switch accounting (`opt-stats`).
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadStats {
    pub exec_time_ns: u64,
    pub context_switches: u64,
    pub voluntary_switches: u64,
}

impl ThreadStats {
    /// Reset accounting, as done on migration (§4.8: "reset execution-time
    /// statistics").
    pub fn reset(&mut self) {
        *self = ThreadStats::default();
    }

    pub fn account_switch(&mut self, voluntary: bool) {
        self.context_switches += 1;
        if voluntary {
            self.voluntary_switches += 1;
        }
    }
}

/// Start parameters retained so `restart_thread` can replay them.
#[derive(Clone, Copy, Debug, Default)]
pub struct StartParams {
    pub entry: usize,
    pub cookie: usize,
    pub imask: u8,
    pub imode: ThreadState,
}

/// Asynchronous-signal-routine state (§4.6).
#[derive(Clone, Copy, Debug, Default)]
pub struct AsrState {
    pub asr: Option<crate::sched::AsrFn>,
    pub mode: ThreadState,
    pub imask: u8,
    pub level: u32,
    pub signals: u32,
}

/// Round-robin time-slicing parameters.
#[derive(Clone, Copy, Debug)]
pub struct RoundRobin {
    pub period: Option<u64>,
    pub credit: Option<u64>,
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self {
            period: None,
            credit: None,
        }
    }
}

/// Periodic-release bookkeeping (§4.10).
#[derive(Clone, Copy, Debug, Default)]
pub struct Periodic {
    pub timer: Option<TimerId>,
    pub expected_ns: u64,
}

/// The thread control block.
pub struct Tcb {
    pub id: ThreadId,
    pub name: heapless::String<32>,
    pub user_pid: Option<u64>,

    pub state: ThreadState,
    pub info: ThreadInfo,

    pub bprio: i32,
    pub cprio: i32,
    pub iprio: i32,

    pub wchan: Option<WchanId>,

    pub affinity: CpuMask,
    pub sched: CpuId,

    pub rr: RoundRobin,

    pub resume_timer: Option<TimerId>,
    pub periodic: Periodic,

    pub start: StartParams,
    pub asr: AsrState,

    pub stats: ThreadStats,

    pub fpu_context: FpuContext,

    pub registers: RegisterState,
    pub kernel_stack: usize,
}

impl Tcb {
    /// Construct a fresh, not-yet-queued TCB. Callers still need to follow
    /// up with `suspend_thread(DORMAND|SUSP?, ...)` per `init_thread`'s
    /// contract — this constructor only fills in fields.
    pub fn new(name: &str, prio: i32, sched: CpuId, affinity: CpuMask) -> Self {
        let mut bounded = heapless::String::new();
        let _ = bounded.push_str(&name[..name.len().min(31)]);
        Self {
            id: ThreadId::new(),
            name: bounded,
            user_pid: None,
            state: ThreadState::empty(),
            info: ThreadInfo::empty(),
            bprio: prio,
            cprio: prio,
            iprio: prio,
            wchan: None,
            affinity,
            sched,
            rr: RoundRobin::default(),
            resume_timer: None,
            periodic: Periodic::default(),
            start: StartParams::default(),
            asr: AsrState::default(),
            stats: ThreadStats::default(),
            fpu_context: FpuContext::default(),
            registers: RegisterState::default(),
            kernel_stack: 0,
        }
    }

    /// Construct the always-present per-CPU root (idle) thread.
    pub fn new_root(sched: CpuId) -> Self {
        let mut tcb = Self::new("root", i32::MIN, sched, CpuMask::single(sched));
        tcb.state = ThreadState::READY | ThreadState::ROOT | ThreadState::STARTED;
        tcb
    }

    pub fn is_root(&self) -> bool {
        self.state.contains(ThreadState::ROOT)
    }

    pub fn is_blocked(&self) -> bool {
        self.state.is_blocked()
    }

    pub fn is_ready(&self) -> bool {
        self.state.contains(ThreadState::READY)
    }

    pub fn can_run_on(&self, cpu: CpuId) -> bool {
        self.affinity.contains(cpu)
    }
}

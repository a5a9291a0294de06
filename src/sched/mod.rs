//! The pod: the process-wide real-time scheduling core.
//!
//! [`Pod`] is the singleton the rest of this crate mutates. Its methods are
//! split across sibling modules by concern — lifecycle, suspend/resume,
//! rescheduling, signals, round-robin, periodic release, the time source,
//! and the fault path — the way the teacher crate splits `Thread`'s
//! behavior across `sched::{cfs,deadline,energy}` even though it's all one
//! logical subsystem. Each `impl Pod` block below lives in the file that
//! owns that concern.
//!
//! Per the "global mutable state" design note, every API the pod exposes to
//! skins is a plain method on `&mut Pod`; the module-level free functions at
//! the bottom are the "convenience binding" that thread the process-wide
//! singleton through [`with_pod`] so skins don't have to carry a `Pod`
//! handle of their own.

mod class;
mod diagnostics;
mod fault;
mod hooks;
mod lifecycle;
mod periodic;
mod reschedule;
mod rr;
mod signal;
mod slot;
mod suspend;
mod timesource;

pub use class::PriorityClass;
pub use diagnostics::format_fatal;
pub use hooks::{HookFn, HookType};
pub use signal::AsrFn;
pub use slot::SchedSlot;
pub use timesource::TimeBase;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::cpu::{CpuId, CpuMask};
use crate::error::{PodError, PodResult};
use crate::mask::PodStatus;
use crate::sync::NkLock;
use crate::thread::{Tcb, ThreadId};
use crate::traits::{Arch, ShadowBridge, Synch, TimerWheel};
use hooks::Hooks;

/// The collaborator backends a [`Pod`] was constructed with.
///
/// Bundled into one struct (rather than four separate fields threaded
/// through every call) because they are always supplied and consumed
/// together, at `Pod::new` time, and never swapped out independently of one
/// another for the lifetime of the pod.
pub struct Collaborators {
    pub arch: &'static dyn Arch,
    pub timers: &'static dyn TimerWheel,
    pub synch: &'static dyn Synch,
    pub shadow: Option<&'static dyn ShadowBridge>,
}

/// The process-wide real-time runtime singleton.
pub struct Pod {
    pub(crate) status: PodStatus,
    pub(crate) refcnt: i32,
    pub(crate) threads: BTreeMap<ThreadId, Tcb>,
    pub(crate) thread_order: Vec<ThreadId>,
    pub(crate) threads_rev: u64,
    pub(crate) hooks: Hooks,
    pub(crate) sched: Vec<SchedSlot>,
    pub(crate) affinity_mask: CpuMask,
    pub(crate) collab: Collaborators,
    pub(crate) timebase: TimeBase,
    pub(crate) fatal_diagnostic: Option<alloc::string::String>,
}

impl Pod {
    /// First-init construction: one scheduler slot (and root thread) per
    /// online CPU, time source enabled, status `ACTIVE` (§4.1).
    pub fn new(collab: Collaborators, online: CpuMask) -> PodResult<Self> {
        let ncpus = online.iter().count();
        if ncpus == 0 {
            return Err(PodError::Inval);
        }
        let mut pod = Pod {
            status: PodStatus::empty(),
            refcnt: 0,
            threads: BTreeMap::new(),
            thread_order: Vec::new(),
            threads_rev: 0,
            hooks: Hooks::default(),
            sched: Vec::new(),
            affinity_mask: online,
            collab,
            timebase: TimeBase::default(),
            fatal_diagnostic: None,
        };
        for cpu in online.iter() {
            let root = Tcb::new_root(cpu);
            let root_id = root.id;
            pod.insert_thread(root);
            pod.sched.push(SchedSlot::new(cpu, root_id));
        }
        pod.status.insert(PodStatus::ACTIVE);
        pod.refcnt = 1;
        pod.enable_timesource()?;
        Ok(pod)
    }

    pub fn is_active(&self) -> bool {
        self.status.contains(PodStatus::ACTIVE)
    }

    pub fn is_fatal(&self) -> bool {
        self.status.contains(PodStatus::FATAL)
    }

    /// Insert a freshly constructed TCB into the thread table, bumping the
    /// enumeration revision (§3: `threads_rev`).
    pub(crate) fn insert_thread(&mut self, tcb: Tcb) -> ThreadId {
        let id = tcb.id;
        self.threads.insert(id, tcb);
        self.thread_order.push(id);
        self.threads_rev += 1;
        id
    }

    pub(crate) fn remove_thread(&mut self, id: ThreadId) {
        self.threads.remove(&id);
        self.thread_order.retain(|&t| t != id);
        self.threads_rev += 1;
    }

    /// Look up a thread's TCB. Skins hold `ThreadId`s across calls the same
    /// way the teacher's callers hold raw `Thread` pointers; this is the
    /// pod's half of that contract.
    ///
    /// # Panics
    /// If `id` names no thread currently in the pod — callers only ever
    /// hold `ThreadId`s for threads they just looked up under the same lock,
    /// so this indicates a caller bug, not a recoverable runtime condition.
    pub fn thread(&self, id: ThreadId) -> &Tcb {
        self.threads.get(&id).expect("dangling ThreadId")
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> &mut Tcb {
        self.threads.get_mut(&id).expect("dangling ThreadId")
    }

    /// Look up a CPU's scheduler slot (current thread, ready queue, FPU
    /// holder, ...).
    ///
    /// # Panics
    /// If `cpu` has no slot in this pod (outside the online mask it was
    /// constructed with).
    pub fn slot(&self, cpu: CpuId) -> &SchedSlot {
        self.sched
            .iter()
            .find(|s| s.cpu == cpu)
            .expect("no scheduler slot for cpu")
    }

    pub fn slot_mut(&mut self, cpu: CpuId) -> &mut SchedSlot {
        self.sched
            .iter_mut()
            .find(|s| s.cpu == cpu)
            .expect("no scheduler slot for cpu")
    }

    /// Mark a reschedule pending on `cpu`'s slot, sending an IPI if that
    /// isn't the CPU making the request (§5: "resched bitmask + IPI").
    pub(crate) fn poke_resched(&mut self, cpu: CpuId) {
        let here = self.collab.arch.current_cpu();
        self.slot_mut(cpu).resched.insert(cpu);
        if cpu != here {
            self.collab.arch.send_ipi(cpu);
        }
    }

    /// Latch a fatal condition: set `FATAL`, format and retain the
    /// diagnostic, and hand off to the architecture's panic hook. Never
    /// returns (§7: "latch pod status to FATAL ... and enter an
    /// architecture-specific panic").
    pub(crate) fn fatal(&mut self, reason: &str) -> ! {
        self.status.insert(PodStatus::FATAL);
        let diagnostic = diagnostics::format_fatal(self, reason);
        match &mut self.fatal_diagnostic {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(&diagnostic);
            }
            None => self.fatal_diagnostic = Some(diagnostic),
        }
        log::error!("pod fatal: {reason}");
        self.collab.arch.panic(self.fatal_diagnostic.as_deref().unwrap_or(reason))
    }
}

/// The process-wide singleton binding (§9: "a convenience binding at the
/// boundary"). Skins never touch this directly — they go through the free
/// functions below, or [`with_pod`] for anything not yet wrapped.
static POD: NkLock<Option<Pod>> = NkLock::new(None);

/// Run `f` against the live pod, or return `PodError::NoDev` if the pod
/// hasn't been initialized (or has been torn down).
pub fn with_pod<R>(f: impl FnOnce(&mut Pod) -> PodResult<R>) -> PodResult<R> {
    let mut guard = POD.lock();
    match guard.as_mut() {
        Some(pod) => f(pod),
        None => Err(PodError::NoDev),
    }
}

/// `Pod::init` (§4.1, §6): initialize the singleton if absent, otherwise
/// just bump the reference count.
pub fn init(collab: Collaborators, online: CpuMask) -> PodResult<()> {
    let mut guard = POD.lock();
    match guard.as_mut() {
        Some(pod) => {
            if pod.status.contains(PodStatus::TEARDOWN) {
                return Err(PodError::Busy);
            }
            pod.refcnt += 1;
            Ok(())
        }
        None => {
            let pod = Pod::new(collab, online)?;
            *guard = Some(pod);
            Ok(())
        }
    }
}

/// `Pod::shutdown` (§4.1, §6): decrement `refcnt`; the last release tears
/// the pod down.
pub fn shutdown(exit_code: i32) -> PodResult<()> {
    let mut guard = POD.lock();
    let finished = {
        let pod = guard.as_mut().ok_or(PodError::NoDev)?;
        pod.refcnt -= 1;
        if pod.refcnt > 0 {
            return Ok(());
        }
        pod.status.insert(PodStatus::TEARDOWN);
        lifecycle::teardown(pod, exit_code);
        true
    };
    if finished {
        *guard = None;
    }
    Ok(())
}

/// `Pod::active?` (§6).
pub fn active() -> bool {
    POD.lock().as_ref().is_some_and(Pod::is_active)
}

//! Thread lifecycle: init, start, restart, delete, abort, mode/priority
//! change, migration, and scheduler locking (§4.2–§4.4, §4.7, §4.8, §6).

use alloc::vec::Vec;

use crate::cpu::{CpuId, CpuMask};
use crate::error::{PodError, PodResult};
use crate::mask::ThreadState;
use crate::thread::{StartParams, Tcb, ThreadId};
use crate::time::{TimeoutMode, INFINITE};

use super::Pod;

/// Flags `init_thread` accepts in its `flags` argument.
const INIT_FLAGS: ThreadState = ThreadState::FPU
    .union(ThreadState::SHADOW)
    .union(ThreadState::SHIELD)
    .union(ThreadState::SUSP);

/// Flags `start_thread` accepts in its `mode` argument.
const START_MODE: ThreadState = ThreadState::LOCK
    .union(ThreadState::RRB)
    .union(ThreadState::ASDI)
    .union(ThreadState::SHIELD)
    .union(ThreadState::SUSP);

impl Pod {
    /// `init_thread` (§4.2): create a DORMANT[|SUSP] thread on the current
    /// CPU's slot. Never reschedules.
    pub fn init_thread(
        &mut self,
        name: &str,
        prio: i32,
        flags: ThreadState,
        affinity: CpuMask,
    ) -> PodResult<ThreadId> {
        if !INIT_FLAGS.contains(flags) {
            return Err(PodError::Inval);
        }
        let cpu = self.collab.arch.current_cpu();
        let bound_affinity = if affinity.is_empty() {
            CpuMask::single(cpu)
        } else {
            affinity
        };
        let tcb = Tcb::new(name, prio, cpu, bound_affinity);
        let id = self.insert_thread(tcb);
        log::debug!("init_thread {} ({:?}) prio={}", name, id, prio);

        let initial = ThreadState::DORMANT | (flags & ThreadState::SUSP);
        self.suspend_thread(id, initial, INFINITE, TimeoutMode::Relative, None)?;
        Ok(id)
    }

    /// `start_thread` (§4.2).
    pub fn start_thread(
        &mut self,
        tid: ThreadId,
        mode: ThreadState,
        imask: u8,
        affinity: CpuMask,
        entry: usize,
        cookie: usize,
    ) -> PodResult<()> {
        if !START_MODE.contains(mode) {
            return Err(PodError::Inval);
        }
        {
            let tcb = self.thread(tid);
            if !tcb.state.contains(ThreadState::DORMANT) || tcb.state.contains(ThreadState::STARTED)
            {
                return Err(PodError::Busy);
            }
        }
        let runnable_affinity = affinity.intersection(self.affinity_mask);
        if runnable_affinity.is_empty() {
            return Err(PodError::Inval);
        }

        {
            let tcb = self.thread_mut(tid);
            tcb.state.remove(START_MODE);
            tcb.state.insert(mode);
            tcb.state.insert(ThreadState::STARTED);
            tcb.start = StartParams {
                entry,
                cookie,
                imask,
                imode: mode,
            };
            tcb.affinity = runnable_affinity;
            if tcb.state.contains(ThreadState::RRB) {
                if let Some(period) = tcb.rr.period {
                    tcb.rr.credit = Some(period);
                }
            }
        }

        let target_cpu = if !runnable_affinity.contains(self.collab.arch.current_cpu()) {
            self.collab
                .arch
                .first_cpu(runnable_affinity)
                .ok_or(PodError::Inval)?
        } else {
            self.thread(tid).sched
        };
        self.thread_mut(tid).sched = target_cpu;

        let stack_top = self.thread(tid).kernel_stack;
        let registers = self.collab.arch.init_thread_context(entry, stack_top, cookie);
        self.thread_mut(tid).registers = registers;
        if self.thread(tid).state.contains(ThreadState::FPU) {
            let mut fpu = self.thread(tid).fpu_context;
            self.collab.arch.init_fpu(&mut fpu);
            self.thread_mut(tid).fpu_context = fpu;
        }

        self.resume_thread(tid, ThreadState::DORMANT);

        let is_root = self.thread(tid).is_root();
        if !is_root {
            self.fire_hooks(target_cpu, super::HookType::Start, tid);
        }
        log::debug!("start_thread {:?} on cpu {}", tid, target_cpu.as_usize());
        self.schedule();
        Ok(())
    }

    /// `restart_thread` (§4.2).
    pub fn restart_thread(&mut self, tid: ThreadId) -> PodResult<()> {
        let (is_started, is_root, is_shadow) = {
            let tcb = self.thread(tid);
            (
                tcb.state.contains(ThreadState::STARTED),
                tcb.is_root(),
                tcb.state.contains(ThreadState::SHADOW),
            )
        };
        if !is_started || is_root || is_shadow {
            return Err(PodError::Perm);
        }

        self.unblock_thread(tid);
        self.collab.synch.release_all_ownerships(tid);

        let is_self = tid == self.slot(self.collab.arch.current_cpu()).curr;
        let cpu = self.thread(tid).sched;

        {
            let tcb = self.thread_mut(tid);
            if tcb.state.contains(ThreadState::SUSP) {
                tcb.state.remove(ThreadState::SUSP);
            }
            let imode = tcb.start.imode;
            tcb.state = (tcb.state & !START_MODE) | (imode & START_MODE) | ThreadState::STARTED;
            tcb.bprio = tcb.iprio;
            tcb.cprio = tcb.iprio;
            tcb.asr.signals = 0;
        }

        if is_self {
            self.thread_mut(tid).state.insert(ThreadState::RESTART);
            self.schedule();
        } else {
            let entry = self.thread(tid).start.entry;
            let cookie = self.thread(tid).start.cookie;
            let stack_top = self.thread(tid).kernel_stack;
            let registers = self.collab.arch.init_thread_context(entry, stack_top, cookie);
            self.thread_mut(tid).registers = registers;
            self.poke_resched(cpu);
            self.schedule();
        }
        log::debug!("restart_thread {:?}", tid);
        Ok(())
    }

    /// `delete_thread` (§4.3).
    ///
    /// Note the distinction between "remove from the thread list" (the
    /// enumeration-only `thread_order`, via `retire_from_order`) and
    /// "deallocate the TCB" (`remove_thread`, which also drops it from the
    /// `threads` arena): a self-delete's TCB must survive until
    /// `finalize_zombie` runs on the far side of the switch the delete
    /// triggers, even though it is already off the enumeration list.
    pub fn delete_thread(&mut self, tid: ThreadId) -> PodResult<()> {
        let tcb = self.thread(tid);
        if tcb.is_root() {
            self.fatal("attempted to delete the root thread");
        }
        if tcb.state.contains(ThreadState::ZOMBIE) {
            return Ok(());
        }

        let is_shadow = tcb.state.contains(ThreadState::SHADOW);
        let is_dormant = tcb.state.contains(ThreadState::DORMANT);
        let cpu = tcb.sched;
        let current = self.slot(self.collab.arch.current_cpu()).curr;
        let is_current = tid == current;

        if is_shadow && !is_dormant && !is_current {
            if let Some(shadow) = self.collab.shadow {
                shadow.shadow_send_sig(tid, u32::MAX);
            }
            log::debug!("delete_thread {:?} deferred to shadow exit path", tid);
            return Ok(());
        }

        self.retire_from_order(tid);

        if self.thread(tid).is_ready() {
            let priority_cpu = self.thread(tid).sched;
            self.slot_mut(priority_cpu).ready.dequeue(tid);
            self.thread_mut(tid).state.remove(ThreadState::READY);
        }
        if let Some(timer) = self.thread(tid).resume_timer {
            self.collab.timers.stop(timer);
        }
        if let Some(timer) = self.thread(tid).periodic.timer {
            self.collab.timers.stop(timer);
        }
        if let Some(wchan) = self.thread(tid).wchan {
            self.collab.synch.forget_sleeper(tid, wchan);
        }
        self.collab.synch.release_all_ownerships(tid);

        if self.slot(cpu).fpu_holder == Some(tid) {
            self.slot_mut(cpu).fpu_holder = None;
        }

        self.thread_mut(tid).state.insert(ThreadState::ZOMBIE);

        if is_current {
            self.poke_resched(cpu);
            self.schedule();
        } else {
            self.fire_hooks(cpu, super::HookType::Delete, tid);
            if let Some(shadow) = self.collab.shadow {
                shadow.shadow_exit(tid);
            }
            self.remove_thread(tid);
        }
        log::debug!("delete_thread {:?}", tid);
        Ok(())
    }

    /// Drop `tid` from the enumeration-only thread list without
    /// deallocating its TCB (see `delete_thread`'s doc comment).
    fn retire_from_order(&mut self, tid: ThreadId) {
        self.thread_order.retain(|&t| t != tid);
        self.threads_rev += 1;
    }

    /// `abort_thread` (§4.3).
    pub fn abort_thread(&mut self, tid: ThreadId) -> PodResult<()> {
        let current = self.slot(self.collab.arch.current_cpu()).curr;
        if tid != current {
            self.suspend_thread(tid, ThreadState::DORMANT, INFINITE, TimeoutMode::Relative, None)?;
        }
        self.delete_thread(tid)
    }

    /// `set_thread_mode(clr, set)` (§6): returns the previous mode bits.
    pub fn set_thread_mode(
        &mut self,
        tid: ThreadId,
        clr: ThreadState,
        set: ThreadState,
    ) -> PodResult<ThreadState> {
        let tcb = self.thread_mut(tid);
        let previous = tcb.state;
        tcb.state.remove(clr);
        tcb.state.insert(set);
        Ok(previous)
    }

    /// `renice_thread` (§4.7).
    pub fn renice_thread(&mut self, tid: ThreadId, prio: i32) -> PodResult<()> {
        let (boosted, old_prio, locked, wchan) = {
            let tcb = self.thread(tid);
            (
                tcb.state.contains(ThreadState::BOOST),
                tcb.cprio,
                tcb.state.contains(ThreadState::LOCK),
                tcb.wchan,
            )
        };
        self.thread_mut(tid).bprio = prio;
        if !boosted || prio > old_prio {
            self.thread_mut(tid).cprio = prio;
        }
        let new_prio = self.thread(tid).cprio;

        if let Some(wchan) = wchan {
            if new_prio != old_prio {
                self.collab.synch.renice_sleeper(tid, wchan, new_prio);
            }
        }

        if self.thread(tid).is_ready() && !locked {
            let cpu = self.thread(tid).sched;
            self.slot_mut(cpu).ready.reposition(tid, new_prio);
        }
        self.thread_mut(tid).info.insert(crate::mask::ThreadInfo::PRIOSET);
        log::debug!("renice_thread {:?} -> {}", tid, prio);
        Ok(())
    }

    /// `migrate_thread(cpu)` (§4.8): self-migration only.
    ///
    /// Without the `smp` feature there is exactly one scheduler slot and
    /// nothing to migrate to, so every call fails `Perm` regardless of
    /// target (Cargo.toml's `smp` feature doc).
    #[cfg(not(feature = "smp"))]
    pub fn migrate_thread(&mut self, target: CpuId) -> PodResult<()> {
        let _ = target;
        Err(PodError::Perm)
    }

    #[cfg(feature = "smp")]
    pub fn migrate_thread(&mut self, target: CpuId) -> PodResult<()> {
        if self.collab.arch.in_interrupt_context() {
            return Err(PodError::Perm);
        }
        let current_cpu = self.collab.arch.current_cpu();
        let tid = self.slot(current_cpu).curr;
        if !self.thread(tid).can_run_on(target) {
            return Err(PodError::Perm);
        }
        if self.thread(tid).state.contains(ThreadState::LOCK) {
            return Err(PodError::Busy);
        }
        if target == current_cpu {
            return Ok(());
        }

        if self.slot(current_cpu).fpu_holder == Some(tid) {
            self.slot_mut(current_cpu).fpu_holder = None;
        }
        if self.thread(tid).is_ready() {
            self.slot_mut(current_cpu).ready.dequeue(tid);
            self.thread_mut(tid).state.remove(ThreadState::READY);
        }
        self.poke_resched(current_cpu);

        self.thread_mut(tid).sched = target;
        if let Some(timer) = self.thread(tid).periodic.timer {
            self.collab.timers.set_sched(timer, target);
        }

        self.thread_mut(tid).stats.reset();

        // Without an unlocked switch there is no post-switch path to defer
        // to: enqueue onto the target's ready queue right away.
        #[cfg(not(feature = "hw-unlocked-switch"))]
        {
            let priority = self.thread(tid).cprio;
            self.slot_mut(target).ready.enqueue(tid, priority);
            self.thread_mut(tid).state.insert(ThreadState::READY);
        }
        // With an unlocked switch, the target's ready queue is only touched
        // once this CPU actually finishes switching away from `tid` —
        // `schedule_on`'s epilogue enqueues it there when it sees `MIGRATE`
        // set on the outgoing thread (§4.5, §4.8).
        #[cfg(feature = "hw-unlocked-switch")]
        {
            self.thread_mut(tid).state.insert(ThreadState::MIGRATE);
        }

        log::debug!("migrate_thread {:?} -> cpu {}", tid, target.as_usize());
        self.schedule();
        Ok(())
    }

    /// `lock_sched`/`unlock_sched` (§6): disable/re-enable preemption of the
    /// calling thread. Modeled as a simple flag rather than a nesting depth
    /// counter, since nothing in §4/§6 describes nested lock/unlock
    /// semantics beyond "scheduler locked for this thread".
    pub fn lock_sched(&mut self) {
        let tid = self.slot(self.collab.arch.current_cpu()).curr;
        self.thread_mut(tid).state.insert(ThreadState::LOCK);
    }

    pub fn unlock_sched(&mut self) {
        let cpu = self.collab.arch.current_cpu();
        let tid = self.slot(cpu).curr;
        self.thread_mut(tid).state.remove(ThreadState::LOCK);
        self.poke_resched(cpu);
        self.schedule();
    }
}

/// `shutdown`'s body (§4.1): delete every non-root thread, drain zombies,
/// disable the time source, and clear `ACTIVE`. Runs with the pod already
/// locked; the lock is held throughout here rather than dropped before the
/// time source call, a deliberate deviation from the documented race window
/// (see `DESIGN.md`) since this crate has no separate "skin stacking" path
/// that could observe the gap.
pub(super) fn teardown(pod: &mut Pod, exit_code: i32) {
    log::info!("pod shutdown, exit_code={exit_code}");
    let victims: Vec<ThreadId> = pod
        .thread_order
        .iter()
        .copied()
        .filter(|&tid| !pod.thread(tid).is_root())
        .collect();
    for tid in victims {
        let _ = pod.delete_thread(tid);
    }
    let cpus: Vec<CpuId> = pod.sched.iter().map(|slot| slot.cpu).collect();
    for cpu in cpus {
        pod.schedule_on(cpu);
    }
    pod.disable_timesource();
    pod.status.remove(crate::mask::PodStatus::ACTIVE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::noop::{NoopArch, NoopSynch, NoopTimerWheel};
    use crate::sched::Collaborators;

    fn test_pod() -> Pod {
        let arch: &'static NoopArch = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopArch::new()));
        let timers = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopTimerWheel::new()));
        let synch = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopSynch::new()));
        Pod::new(
            Collaborators {
                arch,
                timers,
                synch,
                shadow: None,
            },
            CpuMask::single(CpuId(0)),
        )
        .unwrap()
    }

    #[test]
    fn init_thread_rejects_unrecognized_flags() {
        let mut pod = test_pod();
        let err = pod
            .init_thread("bad", 5, ThreadState::ROOT, CpuMask::EMPTY)
            .unwrap_err();
        assert_eq!(err, PodError::Inval);
    }

    #[test]
    fn init_thread_creates_a_dormant_thread_bound_to_the_current_cpu() {
        let mut pod = test_pod();
        let tid = pod
            .init_thread("worker", 5, ThreadState::empty(), CpuMask::EMPTY)
            .unwrap();
        assert!(pod.thread(tid).state.contains(ThreadState::DORMANT));
        assert!(pod.thread(tid).affinity.contains(CpuId(0)));
    }

    #[test]
    fn start_thread_rejects_a_thread_that_is_not_dormant() {
        let mut pod = test_pod();
        let tid = pod
            .init_thread("worker", 5, ThreadState::empty(), CpuMask::EMPTY)
            .unwrap();
        pod.start_thread(tid, ThreadState::empty(), 0, CpuMask::EMPTY, 0, 0)
            .unwrap();
        let err = pod
            .start_thread(tid, ThreadState::empty(), 0, CpuMask::EMPTY, 0, 0)
            .unwrap_err();
        assert_eq!(err, PodError::Busy);
    }

    #[test]
    fn start_thread_clears_dormant_and_marks_started() {
        let mut pod = test_pod();
        let tid = pod
            .init_thread("worker", 5, ThreadState::empty(), CpuMask::EMPTY)
            .unwrap();
        pod.start_thread(tid, ThreadState::empty(), 0, CpuMask::EMPTY, 0x1000, 0)
            .unwrap();
        assert!(!pod.thread(tid).state.contains(ThreadState::DORMANT));
        assert!(pod.thread(tid).state.contains(ThreadState::STARTED));
        assert!(pod.thread(tid).is_ready());
    }

    #[test]
    fn delete_thread_on_a_non_current_thread_removes_it_from_enumeration() {
        let mut pod = test_pod();
        let tid = pod
            .init_thread("worker", 5, ThreadState::empty(), CpuMask::EMPTY)
            .unwrap();
        pod.start_thread(tid, ThreadState::empty(), 0, CpuMask::EMPTY, 0x1000, 0)
            .unwrap();
        pod.delete_thread(tid).unwrap();
        assert!(!pod.thread_order.contains(&tid));
        assert!(pod.threads.get(&tid).is_none());
    }

    #[test]
    fn delete_thread_twice_is_idempotent() {
        let mut pod = test_pod();
        let tid = pod
            .init_thread("worker", 5, ThreadState::empty(), CpuMask::EMPTY)
            .unwrap();
        pod.start_thread(tid, ThreadState::empty(), 0, CpuMask::EMPTY, 0x1000, 0)
            .unwrap();
        pod.delete_thread(tid).unwrap();
        pod.delete_thread(tid).unwrap();
    }

    #[test]
    fn renice_thread_repositions_a_ready_thread() {
        let mut pod = test_pod();
        let tid = pod
            .init_thread("worker", 5, ThreadState::empty(), CpuMask::EMPTY)
            .unwrap();
        pod.start_thread(tid, ThreadState::empty(), 0, CpuMask::EMPTY, 0x1000, 0)
            .unwrap();
        pod.renice_thread(tid, 20).unwrap();
        assert_eq!(pod.thread(tid).cprio, 20);
        assert_eq!(pod.thread(tid).bprio, 20);
        assert!(pod.thread(tid).info.contains(crate::mask::ThreadInfo::PRIOSET));
    }

    #[test]
    fn renice_thread_while_priority_boosted_only_raises_effective_priority() {
        let mut pod = test_pod();
        let tid = pod
            .init_thread("worker", 5, ThreadState::empty(), CpuMask::EMPTY)
            .unwrap();
        pod.thread_mut(tid).state.insert(ThreadState::BOOST);
        pod.thread_mut(tid).cprio = 50;
        pod.renice_thread(tid, 10).unwrap();
        assert_eq!(pod.thread(tid).bprio, 10);
        assert_eq!(pod.thread(tid).cprio, 50);
    }

    #[test]
    fn lock_sched_then_unlock_sched_clears_the_lock_bit() {
        let mut pod = test_pod();
        pod.lock_sched();
        let root = pod.slot(CpuId(0)).curr;
        assert!(pod.thread(root).state.contains(ThreadState::LOCK));
        pod.unlock_sched();
        assert!(!pod.thread(root).state.contains(ThreadState::LOCK));
    }

    #[cfg(not(feature = "smp"))]
    #[test]
    fn migrate_thread_always_fails_without_smp() {
        let mut pod = test_pod();
        assert_eq!(pod.migrate_thread(CpuId(0)), Err(PodError::Perm));
    }

    #[cfg(feature = "smp")]
    #[test]
    fn migrate_thread_to_the_current_cpu_is_a_no_op() {
        let mut pod = test_pod();
        let tid = pod
            .init_thread("worker", 5, ThreadState::empty(), CpuMask::EMPTY)
            .unwrap();
        pod.start_thread(tid, ThreadState::empty(), 0, CpuMask::EMPTY, 0x1000, 0)
            .unwrap();
        assert_eq!(pod.migrate_thread(CpuId(0)), Ok(()));
    }

    #[cfg(feature = "smp")]
    #[test]
    fn migrate_thread_rejects_a_target_outside_affinity() {
        let mut pod = test_pod();
        let tid = pod
            .init_thread(
                "worker",
                5,
                ThreadState::empty(),
                CpuMask::single(CpuId(0)),
            )
            .unwrap();
        pod.start_thread(tid, ThreadState::empty(), 0, CpuMask::EMPTY, 0x1000, 0)
            .unwrap();
        assert_eq!(pod.migrate_thread(CpuId(1)), Err(PodError::Perm));
    }

    #[cfg(feature = "smp")]
    fn dual_cpu_test_pod() -> Pod {
        let arch: &'static NoopArch = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopArch::new()));
        let timers = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopTimerWheel::new()));
        let synch = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopSynch::new()));
        Pod::new(
            Collaborators {
                arch,
                timers,
                synch,
                shadow: None,
            },
            CpuMask::all(2),
        )
        .unwrap()
    }

    /// `hw-unlocked-switch` (§4.5, §4.8): `migrate_thread` marks the thread
    /// `MIGRATE` instead of enqueueing it onto the target's ready queue right
    /// away; the enqueue only happens once `schedule()`'s switch epilogue
    /// actually runs, and `MIGRATE` doesn't outlive that call.
    #[cfg(all(feature = "smp", feature = "hw-unlocked-switch"))]
    #[test]
    fn migrate_thread_defers_the_target_enqueue_to_the_switch_epilogue() {
        let mut pod = dual_cpu_test_pod();

        let affinity = CpuMask::single(CpuId(0)).union(CpuMask::single(CpuId(1)));
        let tid = pod.init_thread("worker", 10, ThreadState::empty(), affinity).unwrap();
        pod.start_thread(tid, ThreadState::empty(), 0, affinity, 0x1000, 0)
            .unwrap();
        assert_eq!(pod.slot(CpuId(0)).curr, tid);

        pod.migrate_thread(CpuId(1)).unwrap();

        assert_eq!(pod.thread(tid).sched, CpuId(1));
        assert!(
            !pod.thread(tid).state.contains(ThreadState::MIGRATE),
            "MIGRATE must not outlive the switch epilogue that cleared it"
        );
        assert!(
            pod.thread(tid).is_ready() || pod.slot(CpuId(1)).curr == tid,
            "the migrated thread ends up runnable on its new slot"
        );
    }
}

//! The central rescheduler (§4.5: `schedule`).
//!
//! One call does all of it: clear this CPU's pending-resched bit (forwarding
//! any peer bits that piggy-backed on this slot), record an outgoing zombie,
//! ask the ready-queue policy who runs next, and — if that's someone new —
//! fire the delete/switch hooks, hand over the FPU, and perform the
//! architecture context switch.
//!
//! Real hardware context switches are control transfers, not function
//! calls — `switch_to` doesn't return here until *some* thread switches back
//! to this exact call site. The test/noop backend's `switch_to` is a
//! same-stack no-op, so this function's post-switch epilogue (hook firing,
//! zombie finalization) runs synchronously right after it, which is the only
//! coherent way to exercise it single-threaded. A real kernel splits this
//! epilogue onto the "welcome path" new threads take on their first
//! dispatch instead.

use crate::cpu::CpuId;
use crate::mask::ThreadState;
#[cfg(feature = "hw-unlocked-switch")]
use crate::mask::SlotStatus;
use crate::thread::ThreadId;

use super::hooks::HookType;
use super::Pod;

impl Pod {
    /// Re-evaluate who should be running on the calling CPU and switch to
    /// them if it isn't `curr` anymore.
    pub fn schedule(&mut self) {
        if self.collab.arch.in_interrupt_context() {
            // An interrupt handler asking to reschedule escalates to a
            // deferred request elsewhere; opaque to the pod core (§1).
            return;
        }
        let cpu = self.collab.arch.current_cpu();
        self.schedule_on(cpu);
    }

    /// `schedule()`'s body, parameterized over the CPU — split out so tests
    /// (which drive multiple simulated CPUs from one thread) can trigger a
    /// remote slot's reschedule directly, the way a real IPI handler would.
    pub(crate) fn schedule_on(&mut self, cpu: CpuId) {
        let outgoing = self.slot(cpu).curr;

        self.clear_resched(cpu);

        let outgoing_is_zombie = self.thread(outgoing).state.contains(ThreadState::ZOMBIE);
        if outgoing_is_zombie {
            self.slot_mut(cpu).zombie = Some(outgoing);
        }
        let restarting = self.thread(outgoing).state.contains(ThreadState::RESTART);

        // The outgoing thread is never itself a member of its slot's ready
        // queue while it runs (the class's `pick_next` removed it the
        // moment it was dispatched) — but it is still a candidate for the
        // *next* pick if it hasn't blocked, died, or migrated away in the
        // meantime. Without putting it back before asking the class to
        // pick, any thread that just became ready would unconditionally
        // win regardless of priority, since it would be the only entry in
        // the queue. Re-enqueue it at its own priority so `pick_next`
        // compares it fairly against everything else that's ready (§4.5
        // step 4, §8 S1: priority preemption only happens for a strictly
        // higher-priority newcomer).
        let outgoing_still_runnable = !outgoing_is_zombie
            && !restarting
            && self.thread(outgoing).state.contains(ThreadState::READY)
            && self.thread(outgoing).sched == cpu;
        if outgoing_still_runnable {
            let priority = self.thread(outgoing).cprio;
            self.slot_mut(cpu).ready.enqueue(outgoing, priority);
        }

        let next = self.pick_next(cpu);

        if next == outgoing && !restarting {
            // Drain whatever zombie a previous, relaxed-epilogue call left
            // recorded on this slot — nothing else revisits it once the
            // outgoing thread keeps winning `pick_next` against itself.
            self.finalize_zombie(cpu);
            self.dispatch_signals(outgoing);
            return;
        }

        let entering_root = self.thread(next).is_root();
        // §4.5 step 7: a shadow relaxing into host-scheduled (secondary)
        // mode is a hand-off of execution, not an ordinary switch
        // completion — the normal epilogue (zombie finalization, FPU
        // handover, switch hooks, signal dispatch) doesn't apply to it.
        let relaxing = entering_root && self.thread(outgoing).state.contains(ThreadState::SHADOW);

        if entering_root {
            self.rearm_watchdog(cpu, None);
        } else {
            self.rearm_watchdog(cpu, Some(next));
        }

        if outgoing_is_zombie {
            self.fire_hooks(cpu, HookType::Delete, outgoing);
        }

        self.bump_exec_time(cpu, outgoing);

        self.slot_mut(cpu).curr = next;
        self.thread_mut(next).sched = cpu;
        self.thread_mut(outgoing)
            .stats
            .account_switch(!outgoing_is_zombie && !restarting);

        if !relaxing {
            self.switch_fpu(cpu, outgoing, next);
        }

        let from_regs = if outgoing_is_zombie {
            None
        } else {
            Some(&mut self.threads.get_mut(&outgoing).unwrap().registers as *mut _)
        };
        let to_regs = self.thread(next).registers;

        #[cfg(feature = "hw-unlocked-switch")]
        {
            self.slot_mut(cpu).status.insert(SlotStatus::SWLOCK);
            self.slot_mut(cpu).last = Some(outgoing);
        }

        // SAFETY: `next` was just recorded as this slot's `curr`, so it is
        // not running anywhere else; `from_regs`, if present, points at a
        // live field of a TCB this function alone is mutating under the
        // pod lock.
        unsafe {
            match from_regs {
                Some(ptr) => self.collab.arch.switch_to(Some(&mut *ptr), &to_regs),
                None => self.collab.arch.switch_to(None, &to_regs),
            }
        }

        #[cfg(feature = "hw-unlocked-switch")]
        {
            self.slot_mut(cpu).status.remove(SlotStatus::SWLOCK);
            self.slot_mut(cpu).last = None;
            // §4.8: a self-migration deferred its remote enqueue to this
            // point rather than touching the target's ready queue while the
            // migrating thread was still switching off this CPU.
            if self.thread(outgoing).state.contains(ThreadState::MIGRATE) {
                self.thread_mut(outgoing).state.remove(ThreadState::MIGRATE);
                if !outgoing_is_zombie {
                    let target = self.thread(outgoing).sched;
                    let priority = self.thread(outgoing).cprio;
                    self.thread_mut(outgoing).state.insert(ThreadState::READY);
                    self.slot_mut(target).ready.enqueue(outgoing, priority);
                }
            }
        }

        if restarting {
            self.thread_mut(next).state.remove(ThreadState::RESTART);
            self.collab.arch.finalize_no_switch();
        }

        if relaxing {
            return;
        }

        self.finalize_zombie(cpu);

        if !entering_root {
            self.fire_hooks(cpu, HookType::Switch, next);
        }
        self.dispatch_signals(next);
    }

    /// Credit the outgoing thread with the CPU time it used since this slot's
    /// last switch (`opt-stats`). A no-op without the feature, since nothing
    /// else reads `exec_time_ns` in that configuration.
    #[cfg(feature = "opt-stats")]
    fn bump_exec_time(&mut self, cpu: CpuId, outgoing: ThreadId) {
        let now = self.collab.arch.get_cpu_time();
        let last = self.slot(cpu).last_switch_ns;
        self.thread_mut(outgoing).stats.exec_time_ns += now.saturating_sub(last);
        self.slot_mut(cpu).last_switch_ns = now;
    }

    #[cfg(not(feature = "opt-stats"))]
    fn bump_exec_time(&mut self, _cpu: CpuId, _outgoing: ThreadId) {}

    fn clear_resched(&mut self, cpu: CpuId) {
        let slot = self.slot_mut(cpu);
        slot.resched.remove(cpu);
        let piggybacked = slot.resched;
        if !piggybacked.is_empty() {
            slot.resched = crate::cpu::CpuMask::EMPTY;
            for peer in piggybacked.iter() {
                self.collab.arch.send_ipi(peer);
            }
        }
    }

    fn pick_next(&mut self, cpu: CpuId) -> ThreadId {
        let slot = self.slot_mut(cpu);
        slot.ready.pick_next().unwrap_or(slot.rootcb)
    }

    /// Finalize whatever zombie this slot recorded on a previous call: drop
    /// it from the thread table after releasing its synchronization-object
    /// ownerships (§4.3: "the switch away from it performs the actual
    /// deallocation").
    fn finalize_zombie(&mut self, cpu: CpuId) {
        let Some(zombie) = self.slot_mut(cpu).zombie.take() else {
            return;
        };
        self.collab.synch.release_all_ownerships(zombie);
        if let Some(shadow) = self.collab.shadow {
            shadow.shadow_exit(zombie);
        }
        self.remove_thread(zombie);
    }

    /// Lazy FPU handover (§4.9): only touch hardware state when the
    /// incoming thread actually uses the FPU and isn't already the CPU's
    /// current holder.
    fn switch_fpu(&mut self, cpu: CpuId, outgoing: ThreadId, incoming: ThreadId) {
        if !self.thread(outgoing).state.contains(ThreadState::ZOMBIE)
            && self.thread(outgoing).state.contains(ThreadState::FPU)
            && self.slot(cpu).fpu_holder == Some(outgoing)
        {
            let mut context = self.thread(outgoing).fpu_context;
            self.collab.arch.save_fpu(&mut context);
            self.thread_mut(outgoing).fpu_context = context;
        }

        if !self.thread(incoming).state.contains(ThreadState::FPU) {
            return;
        }
        if self.slot(cpu).fpu_holder == Some(incoming) {
            self.collab.arch.enable_fpu();
            return;
        }
        let context = self.thread(incoming).fpu_context;
        self.collab.arch.restore_fpu(&context);
        self.slot_mut(cpu).fpu_holder = Some(incoming);
    }

    /// Reset or arm the watchdog timer for the thread about to become
    /// `curr` (`opt-watchdog`; `None` means the root thread is taking over,
    /// which disarms it). Without the feature the slot's `watchdog_timer`
    /// stays `None` forever and this is a no-op.
    #[cfg(feature = "opt-watchdog")]
    fn rearm_watchdog(&mut self, cpu: CpuId, incoming: Option<ThreadId>) {
        match incoming {
            None => {
                if let Some(timer) = self.slot(cpu).watchdog_timer {
                    self.collab.timers.stop(timer);
                }
            }
            Some(_) => {
                let timer = match self.slot(cpu).watchdog_timer {
                    Some(timer) => timer,
                    None => {
                        let timer = super::suspend::alloc_timer_id();
                        self.collab.timers.set_sched(timer, cpu);
                        self.slot_mut(cpu).watchdog_timer = Some(timer);
                        timer
                    }
                };
                self.collab.timers.start_relative(timer, WATCHDOG_PERIOD_NS);
            }
        }
    }

    #[cfg(not(feature = "opt-watchdog"))]
    fn rearm_watchdog(&mut self, _cpu: CpuId, _incoming: Option<ThreadId>) {}
}

/// Time a thread may hold the CPU with scheduling locked before the watchdog
/// would trip (`opt-watchdog`). 5 seconds, matching the pod's own notion of
/// "pathologically long" rather than any particular hardware deadline.
#[cfg(feature = "opt-watchdog")]
const WATCHDOG_PERIOD_NS: u64 = 5_000_000_000;

//! Suspend, resume, unblock (§4.4): the state-machine edges driven by
//! external events — timeouts, signals, resource grants.

use crate::error::{PodError, PodResult};
use crate::mask::{ThreadInfo, ThreadState};
use crate::thread::ThreadId;
use crate::time::{TimeoutMode, INFINITE};
use crate::traits::WchanId;

use super::Pod;

impl Pod {
    /// `suspend_thread` (§4.4).
    pub fn suspend_thread(
        &mut self,
        tid: ThreadId,
        mask: ThreadState,
        timeout: u64,
        timeout_mode: TimeoutMode,
        wchan: Option<WchanId>,
    ) -> PodResult<()> {
        if self.thread(tid).is_root() {
            self.fatal("attempted to suspend the root thread");
        }
        if wchan.is_some() && self.thread(tid).wchan.is_some() {
            self.fatal("conjunctive wait: thread already has a wait channel");
        }

        let cpu = self.thread(tid).sched;
        let is_current = tid == self.slot(cpu).curr;
        if is_current {
            self.slot_mut(cpu).resched.insert(cpu);
        }

        let was_blocked = self.thread(tid).is_blocked();
        let is_shadow = self.thread(tid).state.contains(ThreadState::SHADOW);
        let kicked = self.thread(tid).info.contains(ThreadInfo::KICKED);
        if !was_blocked && is_shadow && kicked {
            let info = &mut self.thread_mut(tid).info;
            info.remove(ThreadInfo::RMID | ThreadInfo::TIMEO);
            info.insert(ThreadInfo::BREAK);
            return Ok(());
        }

        if !(timeout == INFINITE && timeout_mode == TimeoutMode::Relative) {
            let deadline_passed = self.arm_resume_timer(tid, timeout, timeout_mode);
            if deadline_passed {
                if let Some(wchan) = wchan {
                    self.thread_mut(tid).wchan = Some(wchan);
                    self.collab.synch.forget_sleeper(tid, wchan);
                }
                self.thread_mut(tid).info.insert(ThreadInfo::TIMEO);
                return Ok(());
            }
            self.thread_mut(tid).state.insert(ThreadState::DELAY);
        }

        if self.thread(tid).is_ready() {
            self.slot_mut(cpu).ready.dequeue(tid);
            self.thread_mut(tid).state.remove(ThreadState::READY);
        }

        self.thread_mut(tid).state.insert(mask);
        if let Some(wchan) = wchan {
            self.thread_mut(tid).wchan = Some(wchan);
        }

        if is_current {
            self.schedule();
        } else {
            let relaxed_shadow = self.thread(tid).state.contains(ThreadState::RELAX);
            let mask_is_delay_or_susp = mask.difference(ThreadState::DELAY | ThreadState::SUSP).is_empty();
            if relaxed_shadow && mask_is_delay_or_susp {
                if let Some(shadow) = self.collab.shadow {
                    shadow.shadow_suspend(tid);
                }
            }
        }
        Ok(())
    }

    /// Arm the resume timer per `timeout`/`timeout_mode`. Returns `true` if
    /// the deadline has already passed (absolute deadlines only).
    fn arm_resume_timer(&mut self, tid: ThreadId, timeout: u64, mode: TimeoutMode) -> bool {
        if mode == TimeoutMode::Absolute {
            let now = self.now();
            if timeout <= now {
                return true;
            }
        }
        let cpu = self.thread(tid).sched;
        let timer = match self.thread(tid).resume_timer {
            Some(timer) => timer,
            None => {
                let timer = alloc_timer_id();
                self.collab.timers.set_sched(timer, cpu);
                timer
            }
        };
        self.thread_mut(tid).resume_timer = Some(timer);
        match mode {
            TimeoutMode::Relative => self.collab.timers.start_relative(timer, timeout),
            TimeoutMode::Absolute => self.collab.timers.start_absolute(timer, timeout),
        }
        false
    }

    /// `resume_thread` (§4.4). Never calls the rescheduler itself.
    pub fn resume_thread(&mut self, tid: ThreadId, mask: ThreadState) {
        if !self.thread(tid).is_blocked() {
            // Already runnable: "manual round-robin" re-enqueue.
            if self.thread(tid).is_ready() {
                let cpu = self.thread(tid).sched;
                let priority = self.thread(tid).cprio;
                self.slot_mut(cpu).ready.reposition(tid, priority);
            }
            return;
        }

        let had_delay = self.thread(tid).state.contains(ThreadState::DELAY);
        let had_pend = self.thread(tid).state.contains(ThreadState::PEND);
        self.thread_mut(tid).state.remove(mask);

        if mask.contains(ThreadState::DELAY) {
            if let Some(timer) = self.thread(tid).resume_timer {
                self.collab.timers.stop(timer);
            }
        }

        let still_blocked = self.thread(tid).is_blocked();
        let delay_cleared = had_delay && mask.contains(ThreadState::DELAY);
        let pend_cleared = had_pend && mask.contains(ThreadState::PEND);

        if !still_blocked {
            self.finish_wakeup(tid);
            return;
        }

        if delay_cleared && self.thread(tid).state.contains(ThreadState::PEND) {
            if !pend_cleared {
                if let Some(wchan) = self.thread_mut(tid).wchan.take() {
                    self.collab.synch.forget_sleeper(tid, wchan);
                }
            }
            return;
        }

        if pend_cleared && self.thread(tid).state.contains(ThreadState::DELAY) {
            if let Some(timer) = self.thread(tid).resume_timer {
                self.collab.timers.stop(timer);
            }
            self.thread_mut(tid).state.remove(ThreadState::DELAY);
            if !self.thread(tid).is_blocked() {
                self.finish_wakeup(tid);
            }
            return;
        }

        if pend_cleared {
            self.thread_mut(tid).wchan = None;
        }
    }

    /// Common tail of a resume that just cleared the thread's last blocking
    /// bit: forget any wait channel, enqueue it, and latch `WAKEN` (§4.4).
    ///
    /// By elimination this is always an explicit grant: a timer expiry
    /// latches `TIMEO` itself (`on_resume_timer_expiry`) before routing
    /// through `resume_thread`, and `unblock_thread` latches `BREAK` after
    /// `resume_thread` returns, so `WAKEN` is the remaining case whether the
    /// last bit clears directly or, as with `PEND` dragging `DELAY` down
    /// with it, after a second predicate collapses.
    fn finish_wakeup(&mut self, tid: ThreadId) {
        if let Some(wchan) = self.thread_mut(tid).wchan.take() {
            self.collab.synch.forget_sleeper(tid, wchan);
        }
        let cpu = self.thread(tid).sched;
        let priority = self.thread(tid).cprio;
        self.slot_mut(cpu).ready.enqueue(tid, priority);
        self.thread_mut(tid).state.insert(ThreadState::READY);
        self.thread_mut(tid).info.insert(ThreadInfo::WAKEN);
        self.slot_mut(cpu).resched.insert(cpu);
    }

    /// `unblock_thread` (§4.4). Returns whether unblocking took effect.
    pub fn unblock_thread(&mut self, tid: ThreadId) -> bool {
        let state = self.thread(tid).state;
        let acted = if state.contains(ThreadState::DELAY) {
            self.resume_thread(tid, ThreadState::DELAY);
            true
        } else if state.contains(ThreadState::PEND) {
            self.resume_thread(tid, ThreadState::PEND);
            true
        } else {
            false
        };
        if acted {
            self.thread_mut(tid).info.insert(ThreadInfo::BREAK);
        }
        acted
    }

    /// Timer-wheel callback for a resume timer firing (§4.4 step 3): the
    /// timeout elapsed before the wait was otherwise satisfied.
    pub fn on_resume_timer_expiry(&mut self, tid: ThreadId) {
        if !self.thread(tid).state.contains(ThreadState::DELAY) {
            return;
        }
        self.thread_mut(tid).info.insert(ThreadInfo::TIMEO);
        self.resume_thread(tid, ThreadState::DELAY);
    }
}

/// Mint a fresh [`TimerId`] for a resume or periodic timer.
///
/// The real timer wheel collaborator owns its own handle pool in a
/// production kernel; the pod core only ever needs IDs to be distinct and
/// stable for the life of the timer, which a monotonic counter guarantees
/// here without pretending to model the wheel's internals (out of scope,
/// §1).
pub(super) fn alloc_timer_id() -> crate::traits::TimerId {
    use core::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    crate::traits::TimerId(NEXT.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::noop::{NoopArch, NoopSynch, NoopTimerWheel};
    use crate::cpu::CpuMask;
    use crate::sched::Collaborators;
    use crate::thread::Tcb;

    fn test_pod() -> Pod {
        let arch: &'static NoopArch = Box::leak(Box::new(NoopArch::new()));
        let timers = Box::leak(Box::new(NoopTimerWheel::new()));
        let synch = Box::leak(Box::new(NoopSynch::new()));
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

    fn spawn(pod: &mut Pod) -> ThreadId {
        let t = Tcb::new("worker", 10, CpuId(0), CpuMask::single(CpuId(0)));
        let tid = t.id;
        pod.insert_thread(t);
        pod.thread_mut(tid).state = ThreadState::READY;
        pod.slot_mut(CpuId(0)).ready.enqueue(tid, 10);
        tid
    }

    #[test]
    fn suspend_dequeues_a_ready_thread() {
        let mut pod = test_pod();
        let tid = spawn(&mut pod);
        pod.suspend_thread(tid, ThreadState::SUSP, INFINITE, TimeoutMode::Relative, None)
            .unwrap();
        assert!(!pod.thread(tid).is_ready());
        assert!(pod.thread(tid).state.contains(ThreadState::SUSP));
    }

    #[test]
    fn suspend_the_root_thread_is_fatal() {
        use std::panic::{catch_unwind, AssertUnwindSafe};
        let mut pod = test_pod();
        let root = pod.slot(CpuId(0)).rootcb;
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _ = pod.suspend_thread(root, ThreadState::SUSP, INFINITE, TimeoutMode::Relative, None);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn resume_clears_the_matching_bit_and_reenqueues() {
        let mut pod = test_pod();
        let tid = spawn(&mut pod);
        pod.suspend_thread(tid, ThreadState::SUSP, INFINITE, TimeoutMode::Relative, None)
            .unwrap();
        pod.resume_thread(tid, ThreadState::SUSP);
        assert!(pod.thread(tid).is_ready());
        assert!(!pod.thread(tid).is_blocked());
        assert!(pod.thread(tid).info.contains(ThreadInfo::WAKEN));
    }

    #[test]
    fn resume_already_runnable_reorders_ready_queue() {
        let mut pod = test_pod();
        let tid = spawn(&mut pod);
        pod.resume_thread(tid, ThreadState::SUSP);
        assert!(pod.thread(tid).is_ready());
        assert!(!pod.thread(tid).info.contains(ThreadInfo::WAKEN));
    }

    #[test]
    fn resume_with_delay_and_pend_both_set_clearing_only_delay_keeps_it_blocked() {
        let mut pod = test_pod();
        let tid = spawn(&mut pod);
        pod.suspend_thread(tid, ThreadState::PEND, 1_000, TimeoutMode::Relative, Some(WchanId(1)))
            .unwrap();
        assert!(pod.thread(tid).state.contains(ThreadState::DELAY));
        assert!(pod.thread(tid).state.contains(ThreadState::PEND));

        pod.resume_thread(tid, ThreadState::DELAY);
        assert!(pod.thread(tid).is_blocked());
        assert!(pod.thread(tid).state.contains(ThreadState::PEND));
        assert!(!pod.thread(tid).state.contains(ThreadState::DELAY));
        assert!(pod.thread(tid).wchan.is_some());
    }

    #[test]
    fn resume_clearing_pend_while_delay_still_set_stops_the_timer_and_stays_blocked() {
        let mut pod = test_pod();
        let tid = spawn(&mut pod);
        pod.suspend_thread(tid, ThreadState::PEND, 1_000, TimeoutMode::Relative, Some(WchanId(2)))
            .unwrap();

        pod.resume_thread(tid, ThreadState::PEND);
        assert!(!pod.thread(tid).state.contains(ThreadState::DELAY));
        assert!(!pod.thread(tid).state.contains(ThreadState::PEND));
        assert!(pod.thread(tid).is_ready());
    }

    #[test]
    fn on_resume_timer_expiry_latches_timeo_and_resumes() {
        let mut pod = test_pod();
        let tid = spawn(&mut pod);
        pod.suspend_thread(tid, ThreadState::DELAY, 1_000, TimeoutMode::Relative, None)
            .unwrap();
        pod.on_resume_timer_expiry(tid);
        assert!(pod.thread(tid).info.contains(ThreadInfo::TIMEO));
        assert!(pod.thread(tid).is_ready());
    }

    #[test]
    fn on_resume_timer_expiry_ignores_a_thread_not_waiting_on_delay() {
        let mut pod = test_pod();
        let tid = spawn(&mut pod);
        pod.on_resume_timer_expiry(tid);
        assert!(!pod.thread(tid).info.contains(ThreadInfo::TIMEO));
        assert!(pod.thread(tid).is_ready());
    }

    #[test]
    fn unblock_a_delay_blocked_thread_latches_break() {
        let mut pod = test_pod();
        let tid = spawn(&mut pod);
        pod.suspend_thread(tid, ThreadState::DELAY, 1_000, TimeoutMode::Relative, None)
            .unwrap();
        assert!(pod.unblock_thread(tid));
        assert!(pod.thread(tid).info.contains(ThreadInfo::BREAK));
        assert!(pod.thread(tid).is_ready());
    }

    #[test]
    fn unblock_a_runnable_thread_does_nothing() {
        let mut pod = test_pod();
        let tid = spawn(&mut pod);
        assert!(!pod.unblock_thread(tid));
        assert!(!pod.thread(tid).info.contains(ThreadInfo::BREAK));
    }

    #[test]
    fn suspend_with_already_passed_absolute_deadline_latches_timeo_immediately() {
        let mut pod = test_pod();
        let tid = spawn(&mut pod);
        let past = pod.now();
        pod.suspend_thread(tid, ThreadState::PEND, past, TimeoutMode::Absolute, Some(WchanId(3)))
            .unwrap();
        assert!(pod.thread(tid).info.contains(ThreadInfo::TIMEO));
        assert!(pod.thread(tid).is_ready());
    }
}

//! Asynchronous signal dispatch (§4.6: `sigaction`/ASR delivery).
//!
//! A thread's ASR is a plain function pointer the pod core invokes directly
//! with the accumulated signal mask; there is no registered-handler table to
//! look up, matching how the teacher crate treats IPI and interrupt
//! callbacks as bare `fn` pointers rather than trait objects.

use core::mem;

use crate::thread::ThreadId;

use super::Pod;

/// ASR entry point: called with the accumulated signal bitmask since the
/// last dispatch.
pub type AsrFn = fn(u32);

impl Pod {
    /// Post `signal` to `thread`, marking a reschedule pending so the next
    /// `schedule()` on its CPU runs the dispatch (§4.6: "posting sets a bit
    /// and pokes the target's slot").
    pub fn post_signal(&mut self, thread: ThreadId, signal: u32) {
        self.thread_mut(thread).asr.signals |= signal;
        let cpu = self.thread(thread).sched;
        self.poke_resched(cpu);
    }

    /// Run `thread`'s ASR against any pending signals, swapping in its
    /// `asrmode` state for the duration and restoring the prior mode and
    /// interrupt mask afterward.
    ///
    /// Inhibited entirely while `ASDI` is set (§4.6: "asynchronous signal
    /// delivery inhibited").
    pub(crate) fn dispatch_signals(&mut self, thread: ThreadId) {
        let Some(tcb) = self.threads.get_mut(&thread) else {
            return;
        };
        if tcb.state.contains(crate::mask::ThreadState::ASDI) || tcb.asr.signals == 0 {
            return;
        }
        let Some(asr) = tcb.asr.asr else { return };
        let snapshot = mem::take(&mut tcb.asr.signals);
        mem::swap(&mut tcb.state, &mut tcb.asr.mode);
        mem::swap(&mut tcb.start.imask, &mut tcb.asr.imask);
        tcb.asr.level += 1;

        asr(snapshot);

        if let Some(tcb) = self.threads.get_mut(&thread) {
            mem::swap(&mut tcb.state, &mut tcb.asr.mode);
            mem::swap(&mut tcb.start.imask, &mut tcb.asr.imask);
            tcb.asr.level -= 1;
        }
    }

    /// Install (or clear, with `routine = None`) `thread`'s ASR and the mode
    /// bits/interrupt mask it runs under.
    pub fn set_asr(
        &mut self,
        thread: ThreadId,
        routine: Option<AsrFn>,
        mode: crate::mask::ThreadState,
        imask: u8,
    ) {
        let tcb = self.thread_mut(thread);
        tcb.asr.asr = routine;
        tcb.asr.mode = mode;
        tcb.asr.imask = imask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::noop::{NoopArch, NoopSynch, NoopTimerWheel};
    use crate::cpu::{CpuId, CpuMask};
    use crate::sched::Collaborators;

    static SEEN: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(0);

    fn recorder(signals: u32) {
        SEEN.store(signals, core::sync::atomic::Ordering::SeqCst);
    }

    fn test_pod() -> Pod {
        let arch = Box::leak(Box::new(NoopArch::new()));
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

    #[test]
    fn dispatch_invokes_asr_with_accumulated_signals() {
        let mut pod = test_pod();
        let t = crate::thread::Tcb::new("t", 0, CpuId(0), CpuMask::single(CpuId(0)));
        let tid = t.id;
        pod.insert_thread(t);
        pod.set_asr(tid, Some(recorder), crate::mask::ThreadState::empty(), 0);
        SEEN.store(0, core::sync::atomic::Ordering::SeqCst);
        pod.post_signal(tid, 0b101);
        pod.dispatch_signals(tid);
        assert_eq!(SEEN.load(core::sync::atomic::Ordering::SeqCst), 0b101);
        assert_eq!(pod.thread(tid).asr.signals, 0);
    }

    #[test]
    fn asdi_inhibits_dispatch() {
        let mut pod = test_pod();
        let t = crate::thread::Tcb::new("t", 0, CpuId(0), CpuMask::single(CpuId(0)));
        let tid = t.id;
        pod.insert_thread(t);
        pod.set_asr(tid, Some(recorder), crate::mask::ThreadState::empty(), 0);
        pod.thread_mut(tid).state.insert(crate::mask::ThreadState::ASDI);
        SEEN.store(0xdead, core::sync::atomic::Ordering::SeqCst);
        pod.post_signal(tid, 0b1);
        pod.dispatch_signals(tid);
        assert_eq!(SEEN.load(core::sync::atomic::Ordering::SeqCst), 0xdead);
        assert_eq!(pod.thread(tid).asr.signals, 0b1);
    }
}

//! Round-robin quantum management (§4.9).
//!
//! Quantum decrement and preemption on exhaustion are the scheduling
//! class's responsibility (Non-goal: scheduler-class pluggability); this
//! module only owns the pod-wide activate/deactivate toggle.

use alloc::vec::Vec;

use crate::mask::ThreadState;
use crate::time::INFINITE;

use super::Pod;

impl Pod {
    /// `activate_rr(quantum)`: arm every `RRB` thread with a fresh quantum.
    pub fn activate_rr(&mut self, quantum: u64) {
        let ids: Vec<_> = self.threads.keys().copied().collect();
        for tid in ids {
            let tcb = self.thread_mut(tid);
            if tcb.state.contains(ThreadState::RRB) {
                tcb.rr.period = Some(quantum);
                tcb.rr.credit = Some(quantum);
            }
        }
        log::debug!("activate_rr quantum={quantum}");
    }

    /// `deactivate_rr()`: leave `RRB` attached but lift the credit bound.
    pub fn deactivate_rr(&mut self) {
        let ids: Vec<_> = self.threads.keys().copied().collect();
        for tid in ids {
            let tcb = self.thread_mut(tid);
            if tcb.state.contains(ThreadState::RRB) {
                tcb.rr.credit = Some(INFINITE);
            }
        }
        log::debug!("deactivate_rr");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::noop::{NoopArch, NoopSynch, NoopTimerWheel};
    use crate::cpu::{CpuId, CpuMask};
    use crate::sched::Collaborators;
    use crate::thread::Tcb;

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
    fn activate_sets_period_and_credit_for_rrb_threads_only() {
        let mut pod = test_pod();
        let mut rrb = Tcb::new("rrb", 10, CpuId(0), CpuMask::single(CpuId(0)));
        rrb.state.insert(ThreadState::RRB);
        let rrb_id = rrb.id;
        let plain = Tcb::new("plain", 10, CpuId(0), CpuMask::single(CpuId(0)));
        let plain_id = plain.id;
        pod.insert_thread(rrb);
        pod.insert_thread(plain);

        pod.activate_rr(5_000_000);

        assert_eq!(pod.thread(rrb_id).rr.period, Some(5_000_000));
        assert_eq!(pod.thread(rrb_id).rr.credit, Some(5_000_000));
        assert_eq!(pod.thread(plain_id).rr.credit, None);
    }

    #[test]
    fn deactivate_lifts_credit_but_keeps_rrb_flag() {
        let mut pod = test_pod();
        let mut rrb = Tcb::new("rrb", 10, CpuId(0), CpuMask::single(CpuId(0)));
        rrb.state.insert(ThreadState::RRB);
        let rrb_id = rrb.id;
        pod.insert_thread(rrb);
        pod.activate_rr(1_000);
        pod.deactivate_rr();
        assert_eq!(pod.thread(rrb_id).rr.credit, Some(INFINITE));
        assert!(pod.thread(rrb_id).state.contains(ThreadState::RRB));
    }
}

//! Fatal-path diagnostics (§6, §7): a textual dump of every thread across
//! every CPU, for the one diagnostic buffer a latched `FATAL` condition
//! ever produces.

use alloc::string::String;
use core::fmt::Write;

use super::Pod;

/// Render the diagnostic table described in §6: per thread, its CPU, user
/// PID, effective and base priority, pending timeout, state flags, and
/// name; followed by the time base's status and the current CPU.
pub fn format_fatal(pod: &Pod, reason: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "pod fatal: {reason}");
    let _ = writeln!(
        out,
        "{:<6} {:<6} {:<10} {:<6} {:<6} {:<14} {:<10} name",
        "cpu", "tid", "user_pid", "cprio", "bprio", "timeout", "state"
    );
    for &tid in &pod.thread_order {
        let Some(tcb) = pod.threads.get(&tid) else {
            continue;
        };
        let user_pid = tcb
            .user_pid
            .map(|pid| alloc::format!("{pid}"))
            .unwrap_or_else(|| "-".into());
        // The timeout a thread is pending on: whatever `resume_timer` it is
        // blocked against, or its next periodic release if it has no other
        // wait outstanding.
        let timeout = if let Some(timer) = tcb.resume_timer {
            alloc::format!("{}", pod.collab.timers.pexpect(timer))
        } else if tcb.periodic.timer.is_some() {
            alloc::format!("{}", tcb.periodic.expected_ns)
        } else {
            "-".into()
        };
        let _ = writeln!(
            out,
            "{:<6} {:<6} {:<10} {:<6} {:<6} {:<14} {:<10?} {}",
            tcb.sched.as_usize(),
            tcb.id.0,
            user_pid,
            tcb.cprio,
            tcb.bprio,
            timeout,
            tcb.state,
            tcb.name.as_str(),
        );
    }
    let _ = writeln!(
        out,
        "timebase: enabled={} current_cpu={}",
        pod.timebase.enabled,
        pod.collab.arch.current_cpu().as_usize()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::noop::{NoopArch, NoopSynch, NoopTimerWheel};
    use crate::cpu::{CpuId, CpuMask};
    use crate::sched::Collaborators;

    #[test]
    fn format_fatal_includes_reason_and_root_thread() {
        let arch = Box::leak(Box::new(NoopArch::new()));
        let timers = Box::leak(Box::new(NoopTimerWheel::new()));
        let synch = Box::leak(Box::new(NoopSynch::new()));
        let pod = Pod::new(
            Collaborators {
                arch,
                timers,
                synch,
                shadow: None,
            },
            CpuMask::single(CpuId(0)),
        )
        .unwrap();
        let report = format_fatal(&pod, "test reason");
        assert!(report.contains("test reason"));
        assert!(report.contains("root"));
        assert!(report.contains("timeout"));
    }

    #[test]
    fn format_fatal_reports_a_thread_pending_periodic_timeout() {
        use crate::cpu::CpuMask;
        use crate::mask::ThreadState;
        use crate::thread::Tcb;

        let arch = Box::leak(Box::new(NoopArch::new()));
        let timers = Box::leak(Box::new(NoopTimerWheel::new()));
        let synch = Box::leak(Box::new(NoopSynch::new()));
        let mut pod = Pod::new(
            Collaborators {
                arch,
                timers,
                synch,
                shadow: None,
            },
            CpuMask::single(CpuId(0)),
        )
        .unwrap();

        let t = Tcb::new("worker", 10, CpuId(0), CpuMask::single(CpuId(0)));
        let tid = t.id;
        pod.insert_thread(t);
        pod.thread_mut(tid).state = ThreadState::READY;
        pod.thread_mut(tid).periodic.timer = Some(crate::traits::TimerId(1));
        pod.thread_mut(tid).periodic.expected_ns = 42_000;

        let report = format_fatal(&pod, "deadline miss");
        let row = report.lines().find(|l| l.contains("worker")).unwrap();
        assert!(row.contains("42000"), "row should show the pending timeout: {row}");
    }
}

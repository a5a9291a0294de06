//! Periodic release scheduling (§4.10): `set_thread_periodic` and
//! `wait_thread_period`.

use crate::error::{PodError, PodResult};
use crate::mask::{ThreadInfo, ThreadState};
use crate::thread::ThreadId;
use crate::time::{TimeoutMode, INFINITE};

use super::suspend::alloc_timer_id;
use super::Pod;

/// Shortest period accepted on an aperiodic time base, mirroring the
/// "system latency figure" the spec references without pinning a value —
/// chosen generously short so it only rejects genuinely unreasonable
/// periods, not real workloads.
const MIN_PERIOD_NS: u64 = 1_000;

impl Pod {
    /// `set_thread_periodic` (§4.10).
    pub fn set_thread_periodic(&mut self, tid: ThreadId, idate: u64, period: u64) -> PodResult<()> {
        if !self.timebase.enabled {
            return Err(PodError::WouldBlock);
        }
        if period == INFINITE {
            if let Some(timer) = self.thread(tid).periodic.timer {
                self.collab.timers.stop(timer);
            }
            return Ok(());
        }
        if period < MIN_PERIOD_NS && self.timebase.emulated_period_ns == 0 {
            return Err(PodError::Inval);
        }

        let cpu = self.thread(tid).sched;
        let timer = match self.thread(tid).periodic.timer {
            Some(timer) => timer,
            None => {
                let timer = alloc_timer_id();
                self.collab.timers.set_sched(timer, cpu);
                timer
            }
        };
        self.thread_mut(tid).periodic.timer = Some(timer);

        if idate == INFINITE {
            self.collab.timers.start_periodic(timer, period);
            self.thread_mut(tid).periodic.expected_ns = self.now() + period;
            Ok(())
        } else {
            // §4.10: `idate` is given on the time base's own (CPU-time)
            // axis; shift it onto the host-time axis everything else here
            // (timers, `now()`) is expressed in.
            let idate = idate.wrapping_add(self.timebase.wallclock_offset_ns);
            self.collab.timers.start_absolute(timer, idate);
            self.thread_mut(tid).periodic.expected_ns = idate;
            self.suspend_thread(tid, ThreadState::DELAY, idate, TimeoutMode::Absolute, None)
        }
    }

    /// `wait_thread_period` (§4.10). Writes the overrun count into
    /// `overruns_out` regardless of outcome, mirroring the original
    /// out-parameter interface named in §6.
    pub fn wait_thread_period(&mut self, tid: ThreadId, overruns_out: &mut u64) -> PodResult<()> {
        *overruns_out = 0;
        let Some(timer) = self.thread(tid).periodic.timer else {
            return Err(PodError::WouldBlock);
        };
        if !self.collab.timers.is_running(timer) {
            return Err(PodError::WouldBlock);
        }

        let expected = self.collab.timers.pexpect(timer);
        if self.now() < expected {
            self.suspend_thread(tid, ThreadState::DELAY, expected, TimeoutMode::Absolute, None)?;
            if self.thread(tid).info.contains(ThreadInfo::BREAK) {
                return Err(PodError::Intr);
            }
        }

        let overruns = self.collab.timers.get_overruns(timer);
        if overruns > 0 {
            *overruns_out = overruns;
            return Err(PodError::TimedOut);
        }
        Ok(())
    }

    /// Periodic-timer callback (analogous to `on_resume_timer_expiry`):
    /// release a thread waiting on its next period.
    pub fn on_periodic_timer_expiry(&mut self, tid: ThreadId) {
        if self.thread(tid).state.contains(ThreadState::DELAY) {
            self.resume_thread(tid, ThreadState::DELAY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::noop::{NoopArch, NoopSynch, NoopTimerWheel};
    use crate::cpu::{CpuId, CpuMask};
    use crate::mask::ThreadState;
    use crate::sched::Collaborators;
    use crate::thread::Tcb;
    use crate::traits::TimerWheel;

    fn test_pod() -> (Pod, &'static NoopArch, &'static NoopTimerWheel) {
        let arch: &'static NoopArch = Box::leak(Box::new(NoopArch::new()));
        let timers: &'static NoopTimerWheel = Box::leak(Box::new(NoopTimerWheel::new()));
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
        (pod, arch, timers)
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
    fn set_thread_periodic_rejects_too_short_a_period_on_a_real_time_base() {
        let (mut pod, _arch, _timers) = test_pod();
        let tid = spawn(&mut pod);
        let err = pod.set_thread_periodic(tid, INFINITE, 1).unwrap_err();
        assert_eq!(err, PodError::Inval);
    }

    #[test]
    fn set_thread_periodic_with_infinite_period_cancels_the_timer() {
        let (mut pod, _arch, timers) = test_pod();
        let tid = spawn(&mut pod);
        pod.set_thread_periodic(tid, INFINITE, 1_000_000).unwrap();
        let timer = pod.thread(tid).periodic.timer.unwrap();
        assert!(timers.is_running(timer));
        pod.set_thread_periodic(tid, INFINITE, INFINITE).unwrap();
        assert!(!timers.is_running(timer));
    }

    #[test]
    fn wait_thread_period_without_a_timer_would_block() {
        let (mut pod, _arch, _timers) = test_pod();
        let tid = spawn(&mut pod);
        let mut overruns = 0;
        let err = pod.wait_thread_period(tid, &mut overruns).unwrap_err();
        assert_eq!(err, PodError::WouldBlock);
        assert_eq!(overruns, 0);
    }

    #[test]
    fn wait_thread_period_reports_accumulated_overruns() {
        let (mut pod, _arch, timers) = test_pod();
        let tid = spawn(&mut pod);
        pod.set_thread_periodic(tid, INFINITE, 1_000_000).unwrap();
        let timer = pod.thread(tid).periodic.timer.unwrap();
        // Two missed releases before anyone calls `wait_thread_period`.
        timers.fire(timer);
        timers.fire(timer);
        let mut overruns = 0;
        let err = pod.wait_thread_period(tid, &mut overruns).unwrap_err();
        assert_eq!(err, PodError::TimedOut);
        assert_eq!(overruns, 2);
    }

    #[test]
    fn on_periodic_timer_expiry_ignores_a_thread_not_waiting() {
        let (mut pod, _arch, _timers) = test_pod();
        let tid = spawn(&mut pod);
        pod.on_periodic_timer_expiry(tid);
        assert!(pod.thread(tid).is_ready());
    }

    /// §4.10/§4.11: an absolute `idate` is shifted by the time base's
    /// wallclock offset before it is armed.
    #[test]
    fn set_thread_periodic_with_an_absolute_idate_applies_the_wallclock_offset() {
        let (mut pod, arch, timers) = test_pod();
        pod.disable_timesource();
        arch.set_clocks(100_000, 40_000);
        pod.enable_timesource().unwrap();
        assert_eq!(pod.timebase.wallclock_offset_ns, 60_000);

        let tid = spawn(&mut pod);
        pod.set_thread_periodic(tid, 50_000, 1_000_000).unwrap();
        let timer = pod.thread(tid).periodic.timer.unwrap();

        assert_eq!(pod.thread(tid).periodic.expected_ns, 110_000);
        assert_eq!(timers.pexpect(timer), 110_000);
    }
}

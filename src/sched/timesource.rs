//! The pod's time base (§4.11: `enable_timesource`/`disable_timesource`).

use crate::error::PodResult;

use super::Pod;

/// The pod's notion of "now", arbitrated with the architecture's hardware
/// tick (§4.11: "one-shot, relative-periodic, or host-emulated-periodic").
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeBase {
    pub enabled: bool,
    /// Nanosecond period the host must emulate because the hardware can't
    /// run a periodic tick on its own; `0` when the hardware handles it.
    pub emulated_period_ns: u64,
    /// `get_host_time()` minus `get_cpu_time()` at the moment the time
    /// source came up: the correction an absolute deadline expressed against
    /// the CPU-time counter needs to land on the host-time axis `idate`s are
    /// specified in (§4.10, §4.11).
    pub wallclock_offset_ns: u64,
}

impl Pod {
    /// Start the hardware tick on every online CPU, arbitrating the three
    /// outcomes `Arch::start_timer` can report.
    pub fn enable_timesource(&mut self) -> PodResult<()> {
        if self.timebase.enabled {
            return Ok(());
        }
        let mut emulated_period_ns = 0;
        let cpus: alloc::vec::Vec<_> = self.sched.iter().map(|slot| slot.cpu).collect();
        let mut started: alloc::vec::Vec<_> = alloc::vec::Vec::with_capacity(cpus.len());
        for cpu in cpus {
            match self.collab.arch.start_timer(cpu) {
                Ok(mode) => {
                    if mode > 1 {
                        emulated_period_ns = mode;
                    }
                    started.push(cpu);
                }
                Err(err) => {
                    // §4.11: a per-CPU failure rolls back every timer this
                    // call already started rather than leaving the pod with
                    // a tick running on some CPUs and not others.
                    for done in started {
                        self.collab.arch.stop_timer(done);
                    }
                    return Err(err);
                }
            }
        }
        self.timebase.wallclock_offset_ns = self
            .collab
            .arch
            .get_host_time()
            .wrapping_sub(self.collab.arch.get_cpu_time());
        self.timebase.enabled = true;
        self.timebase.emulated_period_ns = emulated_period_ns;
        Ok(())
    }

    /// Stop the hardware tick on every online CPU. A no-op once the pod is
    /// already torn down (§4.1: `shutdown` calls this before the pod status
    /// loses `ACTIVE`).
    pub fn disable_timesource(&mut self) {
        if !self.timebase.enabled {
            return;
        }
        let cpus: alloc::vec::Vec<_> = self.sched.iter().map(|slot| slot.cpu).collect();
        for cpu in cpus {
            self.collab.arch.stop_timer(cpu);
        }
        self.timebase.enabled = false;
    }

    /// Current pod time in nanoseconds, per the architecture's wall clock.
    pub fn now(&self) -> u64 {
        self.collab.arch.get_host_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::noop::{NoopArch, NoopSynch, NoopTimerWheel};
    use crate::cpu::{CpuId, CpuMask};
    use crate::sched::Collaborators;
    use crate::traits::Arch;

    fn test_pod() -> (Pod, &'static NoopArch) {
        let arch: &'static NoopArch = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopArch::new()));
        let timers = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopTimerWheel::new()));
        let synch = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopSynch::new()));
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
        (pod, arch)
    }

    #[test]
    fn new_pod_starts_with_the_timesource_enabled() {
        let (pod, _arch) = test_pod();
        assert!(pod.timebase.enabled);
    }

    #[test]
    fn enable_timesource_is_idempotent() {
        let (mut pod, _arch) = test_pod();
        pod.enable_timesource().unwrap();
        assert!(pod.timebase.enabled);
    }

    #[test]
    fn disable_then_enable_timesource_round_trips() {
        let (mut pod, _arch) = test_pod();
        pod.disable_timesource();
        assert!(!pod.timebase.enabled);
        pod.enable_timesource().unwrap();
        assert!(pod.timebase.enabled);
    }

    #[test]
    fn disable_timesource_twice_is_a_no_op() {
        let (mut pod, _arch) = test_pod();
        pod.disable_timesource();
        pod.disable_timesource();
        assert!(!pod.timebase.enabled);
    }

    #[test]
    fn now_reads_the_architecture_host_clock() {
        let (pod, arch) = test_pod();
        assert_eq!(pod.now(), arch.get_host_time());
    }

    #[test]
    fn enable_timesource_computes_the_wallclock_offset() {
        let (mut pod, arch) = test_pod();
        pod.disable_timesource();
        arch.set_clocks(5_000, 2_000);
        pod.enable_timesource().unwrap();
        assert_eq!(pod.timebase.wallclock_offset_ns, 3_000);
    }

    #[cfg(feature = "smp")]
    fn dual_cpu_test_pod() -> (Pod, &'static NoopArch) {
        let arch: &'static NoopArch = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopArch::new()));
        let timers = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopTimerWheel::new()));
        let synch = alloc::boxed::Box::leak(alloc::boxed::Box::new(NoopSynch::new()));
        let pod = Pod::new(
            Collaborators {
                arch,
                timers,
                synch,
                shadow: None,
            },
            CpuMask::all(2),
        )
        .unwrap();
        (pod, arch)
    }

    /// §4.11: a later CPU's `start_timer` failure stops every timer this
    /// call already armed, rather than leaving CPU0 ticking while CPU1
    /// never came up.
    #[cfg(feature = "smp")]
    #[test]
    fn enable_timesource_rolls_back_already_started_cpus_on_failure() {
        let (mut pod, arch) = dual_cpu_test_pod();
        pod.disable_timesource();
        arch.fail_start_timer_on(CpuId(1));

        let err = pod.enable_timesource().unwrap_err();
        assert_eq!(err, crate::error::PodError::NoDev);
        assert!(!pod.timebase.enabled);
        assert!(!arch.timer_armed(CpuId(0)));
    }
}

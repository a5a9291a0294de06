//! Deterministic `std`-backed collaborator stand-ins used by the unit and
//! scenario tests. Every method is synchronous and records what it was asked
//! to do so tests can assert on side effects (an IPI was sent, a sleeper was
//! forgotten) without needing real hardware.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::cpu::CpuId;
use crate::error::PodResult;
use crate::thread::{RegisterState, ThreadId};
use crate::traits::{Arch, FpuContext, ShadowBridge, Synch, TimerWheel, WchanId};

/// Test [`Arch`] backend: a settable clock, a settable "current CPU", and
/// logs of IPIs sent and FPU operations performed.
pub struct NoopArch {
    current_cpu: AtomicU32,
    host_time_ns: AtomicU64,
    cpu_time_ns: AtomicU64,
    in_interrupt: AtomicBool,
    timers_armed: Mutex<BTreeMap<u32, bool>>,
    ipis_sent: Mutex<Vec<CpuId>>,
    fpu_saves: AtomicU64,
    fpu_restores: AtomicU64,
    fail_start_timer: Mutex<Option<u32>>,
}

impl NoopArch {
    pub fn new() -> Self {
        Self {
            current_cpu: AtomicU32::new(0),
            host_time_ns: AtomicU64::new(0),
            cpu_time_ns: AtomicU64::new(0),
            in_interrupt: AtomicBool::new(false),
            timers_armed: Mutex::new(BTreeMap::new()),
            ipis_sent: Mutex::new(Vec::new()),
            fpu_saves: AtomicU64::new(0),
            fpu_restores: AtomicU64::new(0),
            fail_start_timer: Mutex::new(None),
        }
    }

    /// Simulate the calling thread moving to `cpu` (used instead of actually
    /// running on another core, which a single-process test can't do).
    pub fn set_current_cpu(&self, cpu: CpuId) {
        self.current_cpu.store(cpu.0, Ordering::SeqCst);
    }

    pub fn set_in_interrupt(&self, value: bool) {
        self.in_interrupt.store(value, Ordering::SeqCst);
    }

    /// Advance the simulated clock by `ns` nanoseconds.
    pub fn advance(&self, ns: u64) {
        self.host_time_ns.fetch_add(ns, Ordering::SeqCst);
        self.cpu_time_ns.fetch_add(ns, Ordering::SeqCst);
    }

    /// Set the host and CPU-time clocks independently, so tests can exercise
    /// a time base whose wallclock offset isn't zero (`advance` keeps both
    /// clocks in lockstep, which never does).
    pub fn set_clocks(&self, host_time_ns: u64, cpu_time_ns: u64) {
        self.host_time_ns.store(host_time_ns, Ordering::SeqCst);
        self.cpu_time_ns.store(cpu_time_ns, Ordering::SeqCst);
    }

    pub fn ipis_sent(&self) -> Vec<CpuId> {
        self.ipis_sent.lock().unwrap().clone()
    }

    pub fn fpu_save_count(&self) -> u64 {
        self.fpu_saves.load(Ordering::SeqCst)
    }

    pub fn fpu_restore_count(&self) -> u64 {
        self.fpu_restores.load(Ordering::SeqCst)
    }

    /// Make the next `start_timer(cpu)` call for this CPU fail instead of
    /// arming, so tests can exercise `enable_timesource`'s rollback path.
    pub fn fail_start_timer_on(&self, cpu: CpuId) {
        *self.fail_start_timer.lock().unwrap() = Some(cpu.0);
    }

    /// Whether `start_timer` has been called for `cpu` and is still armed
    /// (not later stopped).
    pub fn timer_armed(&self, cpu: CpuId) -> bool {
        self.timers_armed
            .lock()
            .unwrap()
            .get(&cpu.0)
            .copied()
            .unwrap_or(false)
    }
}

impl Default for NoopArch {
    fn default() -> Self {
        Self::new()
    }
}

impl Arch for NoopArch {
    unsafe fn switch_to(&self, _from: Option<&mut RegisterState>, _to: &RegisterState) {
        // Tests never actually execute thread bodies; the rescheduler only
        // needs this call to happen (and not panic) so its bookkeeping runs.
    }

    fn init_thread_context(&self, entry: usize, stack_top: usize, arg: usize) -> RegisterState {
        RegisterState {
            rdi: arg as u64,
            rsp: stack_top as u64,
            rip: entry as u64,
            rflags: 0x202,
            ..Default::default()
        }
    }

    fn finalize_no_switch(&self) {}

    fn save_fpu(&self, _context: &mut FpuContext) {
        self.fpu_saves.fetch_add(1, Ordering::SeqCst);
    }

    fn restore_fpu(&self, _context: &FpuContext) {
        self.fpu_restores.fetch_add(1, Ordering::SeqCst);
    }

    fn enable_fpu(&self) {}

    fn init_fpu(&self, context: &mut FpuContext) {
        context.0 = [0; 512];
    }

    fn current_cpu(&self) -> CpuId {
        CpuId(self.current_cpu.load(Ordering::SeqCst))
    }

    fn send_ipi(&self, cpu: CpuId) {
        self.ipis_sent.lock().unwrap().push(cpu);
    }

    fn start_timer(&self, cpu: CpuId) -> PodResult<u64> {
        let mut fail_cpu = self.fail_start_timer.lock().unwrap();
        if *fail_cpu == Some(cpu.0) {
            *fail_cpu = None;
            return Err(crate::error::PodError::NoDev);
        }
        drop(fail_cpu);
        self.timers_armed.lock().unwrap().insert(cpu.0, true);
        Ok(0)
    }

    fn stop_timer(&self, cpu: CpuId) {
        self.timers_armed.lock().unwrap().insert(cpu.0, false);
    }

    fn get_host_time(&self) -> u64 {
        self.host_time_ns.load(Ordering::SeqCst)
    }

    fn get_cpu_time(&self) -> u64 {
        self.cpu_time_ns.load(Ordering::SeqCst)
    }

    fn in_interrupt_context(&self) -> bool {
        self.in_interrupt.load(Ordering::SeqCst)
    }

    fn panic(&self, diagnostic: &str) -> ! {
        panic!("pod fatal: {diagnostic}");
    }
}

/// Test [`TimerWheel`] backend. Firing is driven explicitly by tests (there
/// is no background thread ticking these) via [`NoopTimerWheel::fire`].
#[derive(Default)]
pub struct NoopTimerWheel {
    timers: Mutex<BTreeMap<u64, TimerRecord>>,
}

#[derive(Clone, Copy, Default)]
struct TimerRecord {
    running: bool,
    period_ns: u64,
    pexpect_ns: u64,
    overruns: u64,
    cpu: u32,
}

impl NoopTimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `timer` as having fired once, incrementing its overrun count if
    /// it is periodic and still running (simulating a missed release).
    pub fn fire(&self, timer: crate::traits::TimerId) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(rec) = timers.get_mut(&timer.0) {
            if rec.period_ns == 0 {
                rec.running = false;
            } else {
                rec.overruns += 1;
            }
        }
    }
}

impl TimerWheel for NoopTimerWheel {
    fn start_relative(&self, timer: crate::traits::TimerId, delay_ns: u64) {
        let mut timers = self.timers.lock().unwrap();
        let rec = timers.entry(timer.0).or_default();
        rec.running = true;
        rec.period_ns = 0;
        rec.pexpect_ns = delay_ns;
        rec.overruns = 0;
    }

    fn start_absolute(&self, timer: crate::traits::TimerId, date_ns: u64) {
        let mut timers = self.timers.lock().unwrap();
        let rec = timers.entry(timer.0).or_default();
        rec.running = true;
        rec.period_ns = 0;
        rec.pexpect_ns = date_ns;
        rec.overruns = 0;
    }

    fn start_periodic(&self, timer: crate::traits::TimerId, period_ns: u64) {
        let mut timers = self.timers.lock().unwrap();
        let rec = timers.entry(timer.0).or_default();
        rec.running = true;
        rec.period_ns = period_ns;
        rec.pexpect_ns = period_ns;
        rec.overruns = 0;
    }

    fn stop(&self, timer: crate::traits::TimerId) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(rec) = timers.get_mut(&timer.0) {
            rec.running = false;
        }
    }

    fn is_running(&self, timer: crate::traits::TimerId) -> bool {
        self.timers
            .lock()
            .unwrap()
            .get(&timer.0)
            .is_some_and(|r| r.running)
    }

    fn set_sched(&self, timer: crate::traits::TimerId, cpu: CpuId) {
        let mut timers = self.timers.lock().unwrap();
        timers.entry(timer.0).or_default().cpu = cpu.0;
    }

    fn get_overruns(&self, timer: crate::traits::TimerId) -> u64 {
        let mut timers = self.timers.lock().unwrap();
        let rec = timers.entry(timer.0).or_default();
        let count = rec.overruns;
        rec.overruns = 0;
        count
    }

    fn pexpect(&self, timer: crate::traits::TimerId) -> u64 {
        self.timers
            .lock()
            .unwrap()
            .get(&timer.0)
            .map(|r| r.pexpect_ns)
            .unwrap_or(0)
    }

    fn interval(&self, timer: crate::traits::TimerId) -> u64 {
        self.timers
            .lock()
            .unwrap()
            .get(&timer.0)
            .map(|r| r.period_ns)
            .unwrap_or(0)
    }
}

/// Test [`Synch`] backend. Records calls so tests can assert the rest of the
/// pod called into the wait-channel layer at the right moments.
#[derive(Default)]
pub struct NoopSynch {
    forgotten: Mutex<Vec<(ThreadId, WchanId)>>,
    released: Mutex<Vec<ThreadId>>,
    renice_dreord: Mutex<Vec<WchanId>>,
}

impl NoopSynch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forgotten(&self) -> Vec<(ThreadId, WchanId)> {
        self.forgotten.lock().unwrap().clone()
    }
}

impl Synch for NoopSynch {
    fn forget_sleeper(&self, thread: ThreadId, wchan: WchanId) {
        self.forgotten.lock().unwrap().push((thread, wchan));
    }

    fn release_all_ownerships(&self, thread: ThreadId) {
        self.released.lock().unwrap().push(thread);
    }

    fn renice_sleeper(&self, _thread: ThreadId, wchan: WchanId, _priority: i32) {
        self.renice_dreord.lock().unwrap().push(wchan);
    }

    fn flush(&self, _wchan: WchanId) {}
}

/// Test [`ShadowBridge`] backend (`opt-pervasive`); records calls only.
#[derive(Default)]
pub struct NoopShadowBridge {
    calls: Mutex<Vec<&'static str>>,
}

impl NoopShadowBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl ShadowBridge for NoopShadowBridge {
    fn shadow_start(&self, _thread: ThreadId) {
        self.calls.lock().unwrap().push("start");
    }

    fn shadow_suspend(&self, _thread: ThreadId) {
        self.calls.lock().unwrap().push("suspend");
    }

    fn shadow_relax(&self, _thread: ThreadId) {
        self.calls.lock().unwrap().push("relax");
    }

    fn shadow_send_sig(&self, _thread: ThreadId, _signal: u32) {
        self.calls.lock().unwrap().push("send_sig");
    }

    fn shadow_exit(&self, _thread: ThreadId) {
        self.calls.lock().unwrap().push("exit");
    }

    fn shadow_rpi_check(&self, _thread: ThreadId) -> bool {
        self.calls.lock().unwrap().push("rpi_check");
        false
    }

    fn shadow_reset_shield(&self, _thread: ThreadId) {
        self.calls.lock().unwrap().push("reset_shield");
    }
}

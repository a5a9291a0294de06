//! x86_64 architecture backend
//!
//! Implements [`crate::traits::Arch`] on top of raw register save/restore,
//! the local APIC (for IPIs and the per-CPU tick, via [`smp`]), and the FPU
//! save area in [`fpu`]. Boot-time concerns the original teacher crate
//! carried here — GDT/IDT construction, paging, the serial console — belong
//! to a kernel that owns the whole machine; the pod core only needs a
//! running, interrupt-capable CPU handed to it, so those modules were
//! trimmed (see `DESIGN.md`).

pub mod fpu;
pub mod smp;

use core::arch::asm;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::cpu::{CpuId, CpuMask};
use crate::error::PodResult;
use crate::thread::RegisterState;
use crate::traits::{Arch, FpuContext};

/// Disable interrupts, returning the previous `IF` flag so the caller can
/// restore it precisely (nested `irq_save`/`irq_restore` pairs nest
/// correctly because each call captures its own prior state).
#[inline]
pub fn irq_save() -> bool {
    let rflags: u64;
    unsafe {
        asm!("pushfq; pop {}", out(reg) rflags, options(nomem, preserves_flags));
        asm!("cli", options(nomem, nostack));
    }
    rflags & (1 << 9) != 0
}

/// Restore interrupts to the state `saved` recorded.
#[inline]
pub fn irq_restore(saved: bool) {
    if saved {
        unsafe {
            asm!("sti", options(nomem, nostack));
        }
    }
}

#[inline]
pub fn irqs_enabled() -> bool {
    let rflags: u64;
    unsafe {
        asm!("pushfq; pop {}", out(reg) rflags, options(nomem, preserves_flags));
    }
    rflags & (1 << 9) != 0
}

#[inline]
fn halt() {
    unsafe {
        asm!("hlt", options(nomem, nostack));
    }
}

#[inline]
fn rdtsc() -> u64 {
    let (low, high): (u32, u32);
    unsafe {
        asm!("rdtsc", out("eax") low, out("edx") high, options(nomem, nostack));
    }
    ((high as u64) << 32) | (low as u64)
}

/// Save the outgoing thread's callee-saved registers and current stack/flags
/// into `from`. The instruction immediately after the call becomes `from`'s
/// resume point: when some later switch restores `from`, execution returns
/// here and falls through to the caller of `raw_switch_to`.
#[inline(always)]
unsafe fn save_current(from: &mut RegisterState) {
    asm!(
        "mov [{regs} + 0x00], r15",
        "mov [{regs} + 0x08], r14",
        "mov [{regs} + 0x10], r13",
        "mov [{regs} + 0x18], r12",
        "mov [{regs} + 0x40], rbp",
        "mov [{regs} + 0x68], rbx",
        "mov [{regs} + 0x78], rsp",
        "pushfq",
        "pop qword ptr [{regs} + 0x88]",
        regs = in(reg) from as *mut RegisterState,
        options(nostack, preserves_flags),
    );
}

/// Restore `to`'s full register file and stack, jumping to its saved `rip`.
/// Never returns to its caller directly — control resumes wherever `to` was
/// last saved from (or its initial entry point, for a never-yet-run thread).
///
/// # Safety
/// `to` must describe a valid, currently-not-running thread context whose
/// stack and instruction pointer are live.
unsafe fn restore_and_jump(to: &RegisterState) -> ! {
    asm!(
        "mov r15, [{regs} + 0x00]",
        "mov r14, [{regs} + 0x08]",
        "mov r13, [{regs} + 0x10]",
        "mov r12, [{regs} + 0x18]",
        "mov r11, [{regs} + 0x20]",
        "mov r10, [{regs} + 0x28]",
        "mov r9,  [{regs} + 0x30]",
        "mov r8,  [{regs} + 0x38]",
        "mov rbp, [{regs} + 0x40]",
        "mov rdi, [{regs} + 0x48]",
        "mov rsi, [{regs} + 0x50]",
        "mov rdx, [{regs} + 0x58]",
        "mov rcx, [{regs} + 0x60]",
        "mov rbx, [{regs} + 0x68]",
        "mov rsp, [{regs} + 0x78]",
        "push qword ptr [{regs} + 0x88]",
        "popfq",
        "mov rax, [{regs} + 0x70]",
        "jmp qword ptr [{regs} + 0x80]",
        regs = in(reg) to as *const RegisterState,
        options(noreturn),
    );
}

/// Perform the actual machine-level context switch.
///
/// # Safety
/// `to` must describe a valid, currently-not-running thread context.
unsafe fn raw_switch_to(from: Option<&mut RegisterState>, to: &RegisterState) {
    if let Some(from) = from {
        unsafe { save_current(from) };
    }
    unsafe { restore_and_jump(to) };
}

/// The x86_64 [`Arch`] backend.
pub struct ArchImpl;

static CPU_TIME_BASE: AtomicU64 = AtomicU64::new(0);

impl Arch for ArchImpl {
    unsafe fn switch_to(&self, from: Option<&mut RegisterState>, to: &RegisterState) {
        unsafe { raw_switch_to(from, to) };
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

    // Without `hw-fpu` the target is assumed to have no lazily-switchable
    // FPU unit (or one the pod core isn't trusted to touch directly); every
    // hook becomes a no-op. A thread can still request `ThreadState::FPU` at
    // `init_thread`, but `switch_fpu` (§4.9) ends up saving/restoring nothing.
    #[cfg(feature = "hw-fpu")]
    fn save_fpu(&self, context: &mut FpuContext) {
        fpu::save(context);
    }
    #[cfg(not(feature = "hw-fpu"))]
    fn save_fpu(&self, _context: &mut FpuContext) {}

    #[cfg(feature = "hw-fpu")]
    fn restore_fpu(&self, context: &FpuContext) {
        fpu::restore(context);
    }
    #[cfg(not(feature = "hw-fpu"))]
    fn restore_fpu(&self, _context: &FpuContext) {}

    #[cfg(feature = "hw-fpu")]
    fn enable_fpu(&self) {
        fpu::enable();
    }
    #[cfg(not(feature = "hw-fpu"))]
    fn enable_fpu(&self) {}

    #[cfg(feature = "hw-fpu")]
    fn init_fpu(&self, context: &mut FpuContext) {
        fpu::init(context);
    }
    #[cfg(not(feature = "hw-fpu"))]
    fn init_fpu(&self, _context: &mut FpuContext) {}

    fn current_cpu(&self) -> CpuId {
        current_cpu_id()
    }

    fn send_ipi(&self, cpu: CpuId) {
        smp::send_ipi_to(cpu.0, smp::RESCHEDULE_IPI_VECTOR);
    }

    fn start_timer(&self, _cpu: CpuId) -> PodResult<u64> {
        // The local APIC timer needs periodic host-timer assistance to stay
        // in sync across frequency scaling, so we report "1" (a relative
        // periodic host timer suffices) rather than programming one-shot
        // deadlines directly.
        Ok(1)
    }

    fn stop_timer(&self, _cpu: CpuId) {}

    fn get_host_time(&self) -> u64 {
        rdtsc()
    }

    fn get_cpu_time(&self) -> u64 {
        rdtsc().saturating_sub(CPU_TIME_BASE.load(Ordering::Relaxed))
    }

    fn in_interrupt_context(&self) -> bool {
        false
    }

    fn panic(&self, diagnostic: &str) -> ! {
        log::error!("pod fatal: {diagnostic}");
        loop {
            halt();
        }
    }
}

impl ArchImpl {
    pub fn new() -> Self {
        CPU_TIME_BASE.store(rdtsc(), Ordering::Relaxed);
        Self
    }
}

impl Default for ArchImpl {
    fn default() -> Self {
        Self::new()
    }
}

pub fn current_cpu_id() -> CpuId {
    CpuId(smp::current_cpu_id())
}

pub fn online_mask() -> CpuMask {
    CpuMask::all(smp::cpu_count() as usize)
}

//! FPU/SSE context save and restore via `fxsave`/`fxrstor`.
//!
//! The 512-byte legacy save area matches [`crate::traits::FpuContext`]
//! exactly, so there is no translation layer between the opaque context type
//! the pod core passes around and what the CPU instructions want.

use core::arch::asm;

use crate::traits::FpuContext;

/// Save the live FPU/SSE state into `context`.
///
/// # Panics
/// None; `fxsave` never faults on a 16-byte-aligned, correctly sized buffer.
pub fn save(context: &mut FpuContext) {
    let ptr = context.0.as_mut_ptr();
    unsafe {
        asm!("fxsave [{0}]", in(reg) ptr, options(nostack));
    }
}

/// Restore `context` into the FPU/SSE unit.
pub fn restore(context: &FpuContext) {
    let ptr = context.0.as_ptr();
    unsafe {
        asm!("fxrstor [{0}]", in(reg) ptr, options(nostack, readonly));
    }
}

/// Enable the FPU for the current thread (clear `CR0.TS`) without touching
/// its saved content — used when the incoming thread already owns the FPU on
/// this CPU and only needs to be allowed to use it again.
pub fn enable() {
    unsafe {
        asm!("clts", options(nomem, nostack));
    }
}

/// Reset `context` to the power-on FPU state (used the first time an
/// FPU-enabled thread is welcomed onto a CPU).
pub fn init(context: &mut FpuContext) {
    context.0 = [0; 512];
    // Bytes 0..2: FCW (control word), default 0x037F per the Intel SDM.
    context.0[0] = 0x7F;
    context.0[1] = 0x03;
    // Bytes 24..28: MXCSR, default 0x1F80.
    context.0[24] = 0x80;
    context.0[25] = 0x1F;
}

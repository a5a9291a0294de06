//! Architecture-specific code
//!
//! The pod core only ever reaches the architecture layer through the
//! [`crate::traits::Arch`] trait; this module supplies the one real backend
//! (`x86_64`) plus the raw interrupt-save/restore primitives [`sync::NkLock`]
//! needs to implement IRQ-save acquisition, independent of which `Arch`
//! backend is installed.

#[cfg(all(feature = "arch-x86_64", not(test)))]
pub mod x86_64;

#[cfg(all(feature = "arch-x86_64", not(test)))]
pub use x86_64::ArchImpl;

// Test stand-ins for the raw IRQ primitives the lock needs. Real logic
// (state machine, queue bookkeeping, masks) is tested under `std`, so there
// is nothing to disable here.
#[cfg(test)]
pub mod x86_64 {
    use core::sync::atomic::{AtomicBool, Ordering};

    static IRQ_ENABLED: AtomicBool = AtomicBool::new(true);

    /// Disable interrupts, returning the previous enabled state.
    pub fn irq_save() -> bool {
        IRQ_ENABLED.swap(false, Ordering::SeqCst)
    }

    /// Restore interrupts to the state `saved` recorded.
    pub fn irq_restore(saved: bool) {
        IRQ_ENABLED.store(saved, Ordering::SeqCst);
    }

    pub fn irqs_enabled() -> bool {
        IRQ_ENABLED.load(Ordering::SeqCst)
    }
}

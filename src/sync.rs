//! The global lock (`nklock`).
//!
//! Every mutation of the pod, its scheduler slots, thread state, or
//! wait-channel edges goes through a single global lock, acquired
//! IRQ-save-style: interrupts on the current CPU are disabled for the
//! duration of the critical section, and restored to whatever they were on
//! release (nested acquisitions compose because each guard remembers its own
//! prior flag). Acquiring the lock never blocks a CPU that doesn't need it —
//! it is a bare spinlock — but correctness of the state machine in
//! `crate::sched` depends on every mutating path taking it.

use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

/// An IRQ-save spinlock.
pub struct NkLock<T> {
    inner: Mutex<T>,
}

/// RAII guard returned by [`NkLock::lock`]. Dropping it unlocks the spinlock
/// and then restores the interrupt flag, in that order, so interrupts stay
/// masked for the entire time any other CPU could observe the lock held.
pub struct NkLockGuard<'a, T> {
    guard: Option<MutexGuard<'a, T>>,
    irqs_were_enabled: bool,
}

impl<T> NkLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Disable interrupts and acquire the lock.
    pub fn lock(&self) -> NkLockGuard<'_, T> {
        let irqs_were_enabled = crate::arch::x86_64::irq_save();
        NkLockGuard {
            guard: Some(self.inner.lock()),
            irqs_were_enabled,
        }
    }

    /// Non-blocking variant; restores interrupts and returns `None` if the
    /// lock is already held.
    pub fn try_lock(&self) -> Option<NkLockGuard<'_, T>> {
        let irqs_were_enabled = crate::arch::x86_64::irq_save();
        match self.inner.try_lock() {
            Some(guard) => Some(NkLockGuard {
                guard: Some(guard),
                irqs_were_enabled,
            }),
            None => {
                crate::arch::x86_64::irq_restore(irqs_were_enabled);
                None
            }
        }
    }

    /// Access the value without locking, for use only where the caller can
    /// prove exclusive access some other way (e.g. single-threaded tests).
    #[cfg(test)]
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<'a, T> Deref for NkLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.as_ref().expect("guard dropped twice")
    }
}

impl<'a, T> DerefMut for NkLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_mut().expect("guard dropped twice")
    }
}

impl<'a, T> Drop for NkLockGuard<'a, T> {
    fn drop(&mut self) {
        // Unlock first, then restore interrupts, so the window where this
        // CPU can be interrupted while still holding the lock is empty.
        self.guard.take();
        crate::arch::x86_64::irq_restore(self.irqs_were_enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_serializes_access() {
        let lock = NkLock::new(0u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = NkLock::new(0u32);
        let _guard = lock.lock();
        assert!(lock.try_lock().is_none());
    }

    #[test]
    fn irqs_restored_after_unlock() {
        let lock = NkLock::new(());
        let before = crate::arch::x86_64::irqs_enabled();
        {
            let _guard = lock.lock();
            assert!(!crate::arch::x86_64::irqs_enabled());
        }
        assert_eq!(before, crate::arch::x86_64::irqs_enabled());
    }
}

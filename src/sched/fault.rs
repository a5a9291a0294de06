//! Fault path (§4.12): `trap_fault`.

use crate::mask::ThreadState;
use crate::thread::ThreadId;
use crate::time::{TimeoutMode, INFINITE};

use super::Pod;

/// What the architecture's fault handler observed, handed up to the pod so
/// it can decide whether this is a pod-level concern at all.
pub struct FaultInfo {
    pub thread: ThreadId,
    /// The faulting instruction tried to use the FPU.
    pub fpu_fault: bool,
    /// The fault happened in a user-mode (shadow) context rather than a
    /// pure kernel-thread context.
    pub user_fault: bool,
}

impl Pod {
    /// Returns whether the pod claimed (handled) the fault.
    pub fn trap_fault(&mut self, info: FaultInfo) -> bool {
        if !self.is_active() {
            return false;
        }
        let idle = self.thread(info.thread).is_root();
        if idle && !self.collab.arch.in_interrupt_context() {
            return false;
        }

        let is_shadow = self.thread(info.thread).state.contains(ThreadState::SHADOW);

        if info.fpu_fault
            && is_shadow
            && !self.thread(info.thread).state.contains(ThreadState::FPU)
        {
            let mut context = self.thread(info.thread).fpu_context;
            self.collab.arch.init_fpu(&mut context);
            self.thread_mut(info.thread).fpu_context = context;
            self.thread_mut(info.thread).state.insert(ThreadState::FPU);
            log::debug!("trap_fault: lazily initialized FPU for {:?}", info.thread);
            return true;
        }

        if !info.user_fault && !is_shadow {
            let _ = self.suspend_thread(
                info.thread,
                ThreadState::SUSP,
                INFINITE,
                TimeoutMode::Relative,
                None,
            );
            log::warn!("trap_fault: suspended faulting kernel thread {:?}", info.thread);
            return true;
        }

        if is_shadow {
            self.thread_mut(info.thread).state.insert(ThreadState::RELAX);
            if let Some(shadow) = self.collab.shadow {
                shadow.shadow_relax(info.thread);
            }
            log::debug!("trap_fault: relaxed shadow {:?} for host handling", info.thread);
        }
        false
    }
}

//! Lifecycle hook queues (§4.7: `add_hook`/`remove_hook`, fired from the
//! rescheduler on start/switch/delete).

use alloc::vec::Vec;

use crate::cpu::CpuId;
use crate::error::{PodError, PodResult};
use crate::mask::SlotStatus;
use crate::thread::ThreadId;

use super::Pod;

/// A hook callback: takes the thread the event fired for.
pub type HookFn = fn(ThreadId);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookType {
    Start,
    Switch,
    Delete,
}

#[derive(Default)]
pub struct Hooks {
    start: Vec<HookFn>,
    switch: Vec<HookFn>,
    delete: Vec<HookFn>,
}

impl Hooks {
    fn queue(&self, kind: HookType) -> &Vec<HookFn> {
        match kind {
            HookType::Start => &self.start,
            HookType::Switch => &self.switch,
            HookType::Delete => &self.delete,
        }
    }

    fn queue_mut(&mut self, kind: HookType) -> &mut Vec<HookFn> {
        match kind {
            HookType::Start => &mut self.start,
            HookType::Switch => &mut self.switch,
            HookType::Delete => &mut self.delete,
        }
    }
}

impl Pod {
    /// Register `routine` for `kind`, preserving insertion order among
    /// existing hooks of that kind.
    pub fn add_hook(&mut self, kind: HookType, routine: HookFn) -> PodResult<()> {
        let queue = self.hooks.queue_mut(kind);
        if queue.contains(&routine) {
            return Err(PodError::Exist);
        }
        queue.push(routine);
        Ok(())
    }

    /// Unregister `routine` from `kind`'s queue.
    pub fn remove_hook(&mut self, kind: HookType, routine: HookFn) -> PodResult<()> {
        let queue = self.hooks.queue_mut(kind);
        let before = queue.len();
        queue.retain(|&registered| registered != routine);
        if queue.len() == before {
            return Err(PodError::Idrm);
        }
        Ok(())
    }

    /// Run every hook of `kind` against `thread`, in registration order.
    ///
    /// Takes a snapshot before iterating so a hook that adds or removes a
    /// peer mid-run doesn't perturb this pass — it only affects the next
    /// one. Marks the slot `KCOUT` for the duration so a nested
    /// `schedule()` triggered from inside a hook is a visible bug rather
    /// than a silent reentrant switch.
    pub(crate) fn fire_hooks(&mut self, cpu: CpuId, kind: HookType, thread: ThreadId) {
        let snapshot: Vec<HookFn> = self.hooks.queue(kind).clone();
        if snapshot.is_empty() {
            return;
        }
        self.slot_mut(cpu).status.insert(SlotStatus::KCOUT);
        for routine in snapshot {
            routine(thread);
        }
        self.slot_mut(cpu).status.remove(SlotStatus::KCOUT);
    }
}

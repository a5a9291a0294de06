//! # nkpod
//!
//! The process-wide core of a real-time microkernel "pod": thread lifecycle,
//! per-CPU preemptive scheduling, suspend/resume/unblock, the central
//! rescheduler (context switch + FPU handover), asynchronous signal
//! dispatch, round-robin quanta, periodic release, and the hardware time
//! source.
//!
//! Higher-level "skin" APIs (POSIX-like, message-queue, semaphore, ...) are
//! out of scope — this crate is the substrate they would be built on. The
//! timer wheel, the wait-channel (synchronization-object) layer, the
//! interrupt/IPI layer, the ready-queue policy, and the user-space shadow
//! bridge are collaborators this crate only calls through the traits in
//! [`traits`]; a deterministic `std`-backed stand-in for all four lives
//! under [`backend::noop`] and is compiled for tests only.
//!
//! ## Locking
//!
//! Every mutation of the [`sched::Pod`], its per-CPU [`sched::SchedSlot`]s,
//! thread state, or wait-channel edges goes through the single global
//! [`sync::NkLock`] ("nklock"), acquired IRQ-save: interrupts on the calling
//! CPU are disabled for the critical section and restored to whatever they
//! were on release. There is no lock hierarchy to order against — the pod
//! has exactly one lock — but nesting a second acquisition from inside a
//! hook, ASR, or callout is a bug: those run with the slot's `KCOUT` bit set
//! specifically so a reentrant `schedule()` is a visible defect rather than
//! a silent deadlock or double-switch.
//!
//! ## Module layout
//!
//! - [`cpu`] — `CpuId`/`CpuMask`.
//! - [`mask`] — `ThreadState`/`ThreadInfo`/`PodStatus`/`SlotStatus` bitflags.
//! - [`error`] — `PodError`/`PodResult`.
//! - [`time`] — the `INFINITE` sentinel and `TimeoutMode`.
//! - [`thread`] — the thread control block (`Tcb`) and its satellite types.
//! - [`sync`] — the global lock.
//! - [`traits`] — the collaborator interfaces (`Arch`, `SchedClass`,
//!   `TimerWheel`, `Synch`, `ShadowBridge`).
//! - [`sched`] — the pod itself: lifecycle, suspend/resume, the
//!   rescheduler, hooks, signals, round-robin, periodic release, the time
//!   source, and the fault path.
//! - [`arch`] — the x86_64 `Arch` backend (feature `arch-x86_64`).
//! - [`backend`] — in-crate `noop` collaborator backends used only by tests.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(not(test))]
extern crate alloc;
#[cfg(test)]
extern crate std as alloc;

pub mod arch;
pub mod backend;
pub mod cpu;
pub mod error;
pub mod mask;
pub mod sched;
pub mod sync;
pub mod thread;
pub mod time;
pub mod traits;

pub use error::{PodError, PodResult};
pub use sched::{active, init, shutdown, with_pod, Collaborators, Pod};

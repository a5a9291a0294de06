//! In-crate collaborator backends.
//!
//! The pod core only ever reaches its collaborators (architecture, timer
//! wheel, synch layer, shadow bridge) through the traits in
//! [`crate::traits`] (§6, §9 of the design doc: "collaborator traits are
//! stubbed, not faked as production systems"). [`noop`] is a deterministic,
//! `std`-backed implementation of all four, sufficient to drive the unit and
//! scenario tests without any real hardware or timer-wheel access. It is not
//! compiled into ordinary builds — a consuming kernel supplies its own
//! [`crate::arch::x86_64::ArchImpl`] plus real timer-wheel/synch/shadow
//! collaborators. Exposed under `feature = "test-support"` too, so the
//! `tests/scenarios.rs` integration binary (which depends on this crate like
//! any other caller, and so doesn't get `cfg(test)` for free) can reach it.

#[cfg(any(test, feature = "test-support"))]
pub mod noop;

//! The mutual-exclusion primitive every other module is built on.
//!
//! `with` brackets a closure so that, while it runs, no other execution
//! context can observe or mutate the state it touches. On real hardware
//! this means interrupts are masked for the duration; on host builds (and
//! whenever the `critical-section` feature is off) it is a no-op, matching
//! `lifo::Pool`'s "only really `Sync` on the real target" stance.
//!
//! Nesting `with` is safe: the guard only needs to compose with itself on
//! the same execution context, never to be held across a suspension point.
//! No primitive in this crate suspends (yields or awaits) from inside a
//! `with` scope — doing so is a contract violation left to the caller to
//! avoid, per `spec.md` §4.A.

/// Runs `scope` with exclusive access to whatever state it closes over.
///
/// With the `critical-section` feature enabled this defers to the
/// `critical-section` crate (interrupts masked, or whatever the target's
/// `critical-section::Impl` provides). Without it, this is a transparent
/// call: the crate is then only sound to use from a single execution
/// context, which is appropriate for host-side tests and single-threaded
/// simulations.
#[inline]
pub fn with<R>(scope: impl FnOnce() -> R) -> R {
    #[cfg(feature = "critical-section")]
    {
        critical_section::with(|_cs| scope())
    }

    #[cfg(not(feature = "critical-section"))]
    {
        scope()
    }
}

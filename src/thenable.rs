//! A one-shot producer/consumer rendezvous slot.
//!
//! A [`Thenable<T>`] is always in exactly one of two regimes (`spec.md`
//! §4.F): a registered consumer waiting for the next [`resolve`](Thenable::resolve),
//! or no consumer, in which case resolved values accumulate into a single
//! overwritten slot plus a running count of how many arrived unconsumed. The
//! regime is modeled directly as a `RefCell<Slot<T>>` enum rather than the
//! source's "sentinel trampoline" trick `crate::delegate` uses for
//! [`Delegate::null`](crate::delegate::Delegate::null) — `spec.md` doesn't
//! require bytewise sentinel matching here, and an explicit enum is the more
//! direct idiom for "one of two regimes" in Rust.
//!
//! Resolved open questions (`spec.md` §9, decided in `SPEC_FULL.md` and
//! recorded in `DESIGN.md`): `untracked_count` decrements by one on every
//! delivered/consumed value rather than resetting to zero, and a resolve
//! with no consumer always overwrites whatever was previously stored.

use core::cell::RefCell;

use crate::critical_section;
use crate::delegate::Delegate;

enum Slot<T> {
    NoConsumer { stored: Option<T>, untracked: usize },
    Consumer(Delegate<T, ()>),
}

impl<T> Slot<T> {
    const fn empty() -> Self {
        Slot::NoConsumer {
            stored: None,
            untracked: 0,
        }
    }
}

/// A one-shot rendezvous between a producer (via [`ThenableToResolve`]) and
/// a consumer (via [`Thenable::then`]/[`Thenable::set`]).
pub struct Thenable<T> {
    slot: RefCell<Slot<T>>,
}

// SAFETY: `slot` is only ever touched from within `critical_section::with`.
unsafe impl<T: Send> Sync for Thenable<T> {}

impl<T> Thenable<T> {
    /// Creates an empty thenable with no consumer and no stored result.
    pub const fn new() -> Self {
        Thenable {
            slot: RefCell::new(Slot::empty()),
        }
    }

    /// Registers `cb` as the consumer, discarding any currently stored
    /// result. Does not fire synchronously even if a result was stored.
    pub fn set(&self, cb: Delegate<T, ()>) {
        critical_section::with(|| {
            *self.slot.borrow_mut() = Slot::Consumer(cb);
        });
    }

    /// Registers `cb` as the consumer. If a result is already stored, `cb`
    /// fires immediately (synchronously, outside the critical section) with
    /// that value, and [`Thenable::untracked_count`] drops by one; otherwise
    /// this behaves like [`Thenable::set`].
    pub fn then(&self, cb: Delegate<T, ()>) {
        let ready = critical_section::with(|| {
            let mut slot = self.slot.borrow_mut();
            match &mut *slot {
                Slot::NoConsumer {
                    stored: stored @ Some(_),
                    untracked,
                } => {
                    let value = stored.take().unwrap();
                    *untracked = untracked.saturating_sub(1);
                    Some(value)
                }
                _ => {
                    *slot = Slot::Consumer(cb);
                    None
                }
            }
        });
        if let Some(value) = ready {
            cb.call(value);
        }
    }

    /// Attaches a no-op consumer, draining any currently stored result
    /// without acting on it.
    pub fn explicitly_ignore(&self) {
        self.then(Delegate::from_fn(ignore::<T>));
    }

    /// Returns to the empty state: no consumer, no stored result, counter
    /// reset to zero.
    pub fn reset(&self) {
        critical_section::with(|| {
            *self.slot.borrow_mut() = Slot::empty();
        });
    }

    /// Resolves this thenable with `value` via a [`ThenableToResolve`]
    /// handle.
    pub fn resolver(&self) -> ThenableToResolve<'_, T> {
        ThenableToResolve(self)
    }

    fn resolve(&self, value: T) {
        // Returns the consumer (paired back up with `value`, which moved
        // into this closure) when one was registered, so it can be invoked
        // outside the critical section; otherwise `value` is installed into
        // the slot directly and nothing is returned.
        let delivery = critical_section::with(move || {
            let mut slot = self.slot.borrow_mut();
            match &mut *slot {
                Slot::Consumer(cb) => {
                    let cb = *cb;
                    *slot = Slot::empty();
                    Ok((cb, value))
                }
                Slot::NoConsumer { stored, untracked } => {
                    *untracked += 1;
                    *stored = Some(value);
                    Err(())
                }
            }
        });
        if let Ok((cb, value)) = delivery {
            cb.call(value);
        }
    }

    /// Number of resolves that have occurred since the last value was
    /// delivered to a consumer, while no consumer was registered. Always
    /// `0` while a consumer is currently registered.
    pub fn untracked_count(&self) -> usize {
        critical_section::with(|| match &*self.slot.borrow() {
            Slot::NoConsumer { untracked, .. } => *untracked,
            Slot::Consumer(_) => 0,
        })
    }

    /// True iff a consumer is currently registered.
    pub fn has_consumer(&self) -> bool {
        critical_section::with(|| matches!(&*self.slot.borrow(), Slot::Consumer(_)))
    }
}

fn ignore<T>(_: T) {}

/// A non-owning producer-side handle used to resolve a [`Thenable`].
pub struct ThenableToResolve<'a, T>(&'a Thenable<T>);

impl<'a, T> ThenableToResolve<'a, T> {
    /// Resolves the underlying thenable with `value`.
    pub fn resolve(&self, value: T) {
        self.0.resolve(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn resolve_before_then_stores_and_delivers_on_attach() {
        let t: Thenable<u32> = Thenable::new();
        t.resolver().resolve(7);
        assert_eq!(t.untracked_count(), 1);

        let seen = Cell::new(None);
        let cb = unsafe { Delegate::from_ref(&|v: u32| seen.set(Some(v))) };
        t.then(cb);
        assert_eq!(seen.get(), Some(7));
        assert_eq!(t.untracked_count(), 0);
    }

    #[test]
    fn then_before_resolve_fires_on_resolve() {
        let t: Thenable<u32> = Thenable::new();
        let seen = Cell::new(None);
        let cb = unsafe { Delegate::from_ref(&|v: u32| seen.set(Some(v))) };
        t.then(cb);
        assert_eq!(seen.get(), None);
        t.resolver().resolve(3);
        assert_eq!(seen.get(), Some(3));
    }

    #[test]
    fn repeated_resolves_without_a_consumer_overwrite_and_count() {
        let t: Thenable<u32> = Thenable::new();
        t.resolver().resolve(1);
        t.resolver().resolve(2);
        t.resolver().resolve(3);
        assert_eq!(t.untracked_count(), 3);

        let seen = Cell::new(None);
        let cb = unsafe { Delegate::from_ref(&|v: u32| seen.set(Some(v))) };
        t.then(cb);
        assert_eq!(seen.get(), Some(3));
        assert_eq!(t.untracked_count(), 2);
    }

    #[test]
    fn set_discards_any_stored_result() {
        let t: Thenable<u32> = Thenable::new();
        t.resolver().resolve(9);
        let seen = Cell::new(None);
        let cb = unsafe { Delegate::from_ref(&|v: u32| seen.set(Some(v))) };
        t.set(cb);
        assert_eq!(seen.get(), None);
        t.resolver().resolve(10);
        assert_eq!(seen.get(), Some(10));
    }

    #[test]
    fn explicitly_ignore_drains_a_stored_result() {
        let t: Thenable<u32> = Thenable::new();
        t.resolver().resolve(1);
        t.explicitly_ignore();
        assert_eq!(t.untracked_count(), 0);
        assert!(!t.has_consumer());
    }

    #[test]
    fn reset_clears_consumer_and_counter() {
        let t: Thenable<u32> = Thenable::new();
        let cb = Delegate::from_fn(|_: u32| {});
        t.set(cb);
        assert!(t.has_consumer());
        t.reset();
        assert!(!t.has_consumer());
        assert_eq!(t.untracked_count(), 0);
    }

    #[test]
    fn consumer_fires_synchronously_within_resolve() {
        let t: Thenable<u32> = Thenable::new();
        let order = Cell::new(0u32);
        let cb = unsafe {
            Delegate::from_ref(&|_: u32| {
                order.set(order.get() + 1);
            })
        };
        t.then(cb);
        t.resolver().resolve(0);
        assert_eq!(order.get(), 1);
    }
}

//! Unsigned-wraparound interval checks, one-shot and periodic.
//!
//! Both timers here are deliberately dumb compared to [`crate::scheduler`]:
//! they hold no callback and are not chained into anything. They exist for
//! call sites that just want to poll "has this much time passed yet?"
//! without paying for an action node, the same way `rtfm::Instant`/`Duration`
//! (see `examples/perlindgren-rtfm4/src/lib.rs`) let a task compare ticks
//! without a timer queue. [`crate::tick::precedes`]/[`crate::tick::reached`]
//! supply the wraparound comparison both timers are built on.

use core::cell::Cell;

use crate::tick::{self, Tick};

/// A one-shot deadline, armed by [`SimpleTimer::start`] and consumed by
/// [`SimpleTimer::discover`].
///
/// Per `spec.md` §4.G, `discover` must be polled at least once per
/// [`tick::DELTA_MAX`] ticks after `start`; polling less often than that
/// makes the deadline ambiguous under wraparound and is a caller error this
/// type cannot detect.
pub struct SimpleTimer {
    pending: Cell<bool>,
    deadline: Cell<Tick>,
}

impl SimpleTimer {
    /// Creates a timer with nothing pending.
    pub const fn new() -> Self {
        SimpleTimer {
            pending: Cell::new(false),
            deadline: Cell::new(0),
        }
    }

    /// Arms the timer to fire at `now + delta`.
    pub fn start(&self, now: Tick, delta: Tick) {
        self.deadline.set(now.wrapping_add(delta));
        self.pending.set(true);
    }

    /// Returns `true` exactly once: the first call where `now` has reached
    /// or passed the armed deadline. Returns `false` on every other call,
    /// including every call after the one that returned `true`, until
    /// [`SimpleTimer::start`] rearms it.
    pub fn discover(&self, now: Tick) -> bool {
        if self.pending.get() && tick::reached(now, self.deadline.get()) {
            self.pending.set(false);
            true
        } else {
            false
        }
    }

    /// True iff the timer is armed and has not yet fired.
    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    /// Disarms the timer without firing it.
    pub fn cancel(&self) {
        self.pending.set(false);
    }
}

impl Default for SimpleTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// A recurring deadline that rearms itself to `next_deadline + period` each
/// time it is discovered, per `spec.md` §4.G's drift-free absolute-time
/// rule.
///
/// This is the opposite rearm policy from [`crate::scheduler`]'s periodic
/// action nodes, which deliberately rebase from the *dispatch* tick instead
/// (accepting drift to avoid catch-up bursts, per `spec.md` §4.J). A
/// `PeriodicTimer` polled late will fire on several successive `discover`
/// calls in a row until `next_deadline` catches back up to `now` — callers
/// that cannot tolerate a catch-up burst want the scheduler's action node
/// instead.
pub struct PeriodicTimer {
    period: Cell<Tick>,
    next_deadline: Cell<Tick>,
}

impl PeriodicTimer {
    /// Creates an inactive timer (`period == 0`).
    pub const fn new() -> Self {
        PeriodicTimer {
            period: Cell::new(0),
            next_deadline: Cell::new(0),
        }
    }

    /// Arms the timer: first deadline at `now + period`, recurring every
    /// `period` ticks thereafter. `period == 0` makes the timer inactive.
    pub fn start_period(&self, now: Tick, period: Tick) {
        self.period.set(period);
        self.next_deadline.set(now.wrapping_add(period));
    }

    /// Inactive timers (`period == 0`) never discover.
    pub fn is_active(&self) -> bool {
        self.period.get() != 0
    }

    /// Returns `true` once per arrival of the current deadline, advancing
    /// `next_deadline` by `period` (not by however late `now` arrived) so
    /// repeated late polling does not burst-fire.
    pub fn discover(&self, now: Tick) -> bool {
        if self.is_active() && tick::reached(now, self.next_deadline.get()) {
            let period = self.period.get();
            self.next_deadline.set(self.next_deadline.get().wrapping_add(period));
            true
        } else {
            false
        }
    }

    /// Disarms the timer.
    pub fn cancel(&self) {
        self.period.set(0);
    }
}

impl Default for PeriodicTimer {
    fn default() -> Self {
        Self::new()
    }
}

//! Time-ordered dispatch of [`ActionNode`]s.
//!
//! Grounded on `rtfm`'s timer-queue idea (see
//! `examples/perlindgren-rtfm4/src/lib.rs`'s `Instant`/`Duration`
//! wraparound `Ord`, lifted into [`crate::tick`]) generalized from
//! interrupt-priority dispatch to cooperative polling: nothing here runs
//! until the caller calls [`Scheduler::execute_one`]/[`Scheduler::execute_all`].
//! Node ordering is carried by [`crate::list`], the same intrusive ring
//! every other chaining structure in this crate uses.

use core::cell::Cell;

use crate::action_node::{ActionNode, Owner};
use crate::critical_section;
use crate::list::{Linked, List, Node};
use crate::tick::{self, Tick};

#[cfg(feature = "stats")]
const STATS_WINDOW: usize = 16;

/// Worst-case (and, with the `stats` feature, windowed-average)
/// inter-call gap tracking for one dispatch entry point, per `spec.md`
/// §4.J.
pub struct GapMonitor {
    last: Cell<Option<Tick>>,
    worst: Cell<Tick>,
    #[cfg(feature = "stats")]
    window: core::cell::RefCell<heapless::Vec<Tick, STATS_WINDOW>>,
    #[cfg(feature = "stats")]
    write_at: Cell<usize>,
    #[cfg(feature = "stats")]
    sum: Cell<u64>,
}

impl GapMonitor {
    const fn new() -> Self {
        GapMonitor {
            last: Cell::new(None),
            worst: Cell::new(0),
            #[cfg(feature = "stats")]
            window: core::cell::RefCell::new(heapless::Vec::new()),
            #[cfg(feature = "stats")]
            write_at: Cell::new(0),
            #[cfg(feature = "stats")]
            sum: Cell::new(0),
        }
    }

    fn record(&self, now: Tick) {
        if let Some(prev) = self.last.get() {
            let gap = now.wrapping_sub(prev);
            if gap > self.worst.get() {
                self.worst.set(gap);
            }
            // A zero gap (re-entrant call at the same `now`) is excluded
            // from the windowed average but still counted above for the
            // worst case, per spec.md §4.J.
            #[cfg(feature = "stats")]
            if gap != 0 {
                let mut window = self.window.borrow_mut();
                if window.len() < STATS_WINDOW {
                    let _ = window.push(gap);
                } else {
                    let idx = self.write_at.get();
                    self.sum.set(self.sum.get() - window[idx] as u64);
                    window[idx] = gap;
                    self.write_at.set((idx + 1) % STATS_WINDOW);
                }
                self.sum.set(self.sum.get() + gap as u64);
            }
        }
        self.last.set(Some(now));
    }

    /// Largest inter-call gap observed so far.
    pub fn worst_case(&self) -> Tick {
        self.worst.get()
    }

    /// Average of the gaps in the trailing window, or `None` if no
    /// non-zero gap has been recorded yet. Requires the `stats` feature.
    #[cfg(feature = "stats")]
    pub fn windowed_average(&self) -> Option<Tick> {
        let window = self.window.borrow();
        if window.is_empty() {
            None
        } else {
            Some((self.sum.get() / window.len() as u64) as Tick)
        }
    }
}

impl Default for GapMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a sorted-by-deadline list of [`ActionNode`]s and dispatches them
/// one at a time as tick deadlines are reached.
pub struct Scheduler {
    head: Node,
    known_tick: Cell<Tick>,
    started: Cell<bool>,
    /// Gap monitor for [`Scheduler::execute_one`].
    pub execute_one_stats: GapMonitor,
    /// Gap monitor for [`Scheduler::execute_all`].
    pub execute_all_stats: GapMonitor,
}

// SAFETY: all mutation of `head`'s ring and `known_tick` happens inside
// `critical_section::with`.
unsafe impl Sync for Scheduler {}

impl Scheduler {
    /// Creates a scheduler with nothing queued. Call [`Scheduler::start`]
    /// before the first [`Scheduler::execute_one`]/[`Scheduler::execute_all`].
    pub const fn new() -> Self {
        Scheduler {
            head: Node::new(),
            known_tick: Cell::new(0),
            started: Cell::new(false),
            execute_one_stats: GapMonitor::new(),
            execute_all_stats: GapMonitor::new(),
        }
    }

    /// Initializes the scheduler's notion of the current tick.
    pub fn start(&self, now: Tick) {
        self.known_tick.set(now);
        self.started.set(true);
    }

    /// The most recent `now` delivered to [`Scheduler::execute_one`]/
    /// [`Scheduler::execute_all`] (or to [`Scheduler::start`]).
    pub fn known_tick(&self) -> Tick {
        self.known_tick.get()
    }

    /// Deadline of the head of the queue, without dispatching it.
    pub fn has_next_tick(&self) -> Option<Tick> {
        critical_section::with(|| {
            let list = List::new(&self.head);
            list.front().map(|p| deadline_of(p))
        })
    }

    fn insert_ordered(&self, node: &ActionNode, deadline: Tick, stop_at_leq: bool) {
        critical_section::with(|| {
            let list = List::new(&self.head);
            let mut insertion_point = None;
            for existing in list.iter() {
                let existing_ptr = core::ptr::NonNull::from(existing);
                let existing_deadline = deadline_of(existing_ptr);
                let stop = if stop_at_leq {
                    tick::leq(deadline, existing_deadline)
                } else {
                    tick::precedes(deadline, existing_deadline)
                };
                if stop {
                    insertion_point = Some(existing);
                    break;
                }
            }
            match insertion_point {
                Some(existing) => list.insert_before(existing, node.node()),
                None => list.push_back(node.node()),
            }
        });
    }

    /// Inserts `node` so it dispatches after every already-queued node
    /// whose deadline is `<=` its own (FIFO among equal deadlines), per
    /// `spec.md` §4.J's `schedule_after` rule.
    fn schedule_after_ordering(&self, node: &ActionNode, deadline: Tick) {
        self.insert_ordered(node, deadline, false)
    }

    /// Inserts `node` immediately before every already-queued node whose
    /// deadline is `>=` its own (LIFO among equal deadlines), per
    /// `spec.md` §4.J's `schedule_before` rule.
    fn schedule_before_ordering(&self, node: &ActionNode, deadline: Tick) {
        self.insert_ordered(node, deadline, true)
    }

    /// Dispatches at most one due node. Returns `true` if one was
    /// dispatched.
    pub fn execute_one(&self, now: Tick) -> bool {
        self.execute_one_stats.record(now);
        let popped = critical_section::with(|| {
            self.known_tick.set(now);
            let list = List::new(&self.head);
            match list.front() {
                Some(p) if tick::reached(now, deadline_of(p)) => {
                    list.pop_front();
                    Some(p)
                }
                _ => None,
            }
        });
        let Some(node_ptr) = popped else {
            return false;
        };
        let node = unsafe { ActionNode::from_node(node_ptr).as_ref() };
        // `owner` is deliberately left untouched (still `Owner::Scheduled` with
        // the *old* deadline) across the callback: that is the only way to
        // tell "the callback did nothing, so rearm from the period" apart
        // from "the callback called `cancel()`", which overwrites it to
        // `Owner::None` itself. Clearing it here first would erase that
        // distinction, per spec.md §4.J's S5 scenario.
        node.thenable().resolver().resolve(());
        critical_section::with(|| {
            if !node.node().is_unlinked() {
                // The callback relinked this node elsewhere (rescheduled or
                // started listening on a multicast); leave it as-is.
                return;
            }
            match node.owner() {
                Owner::Scheduled { period, .. } if period > 0 => {
                    let deadline = self.known_tick.get().wrapping_add(period);
                    node.set_owner(Owner::Scheduled { deadline, period });
                    self.schedule_after_ordering(node, deadline);
                }
                _ => node.set_owner(Owner::None),
            }
        });
        true
    }

    /// Dispatches every node currently due, in deadline order, stopping
    /// the moment none remain due.
    pub fn execute_all(&self, now: Tick) {
        self.execute_all_stats.record(now);
        while self.execute_one(now) {}
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn deadline_of(node: core::ptr::NonNull<Node>) -> Tick {
    match unsafe { ActionNode::from_node(node).as_ref().owner() } {
        Owner::Scheduled { deadline, .. } => deadline,
        _ => unreachable!("every node queued in a Scheduler carries Owner::Scheduled"),
    }
}

impl ActionNode {
    /// Equivalent to `schedule_after(sched, 1, 0)`.
    pub fn schedule_later(&self, sched: &Scheduler) {
        self.schedule_after(sched, 1, 0);
    }

    /// Equivalent to `schedule_after(sched, 0, 0)`.
    pub fn schedule_now(&self, sched: &Scheduler) {
        self.schedule_after(sched, 0, 0);
    }

    /// Schedules this node to fire at `sched.known_tick() + delay`,
    /// rearming every `period` ticks thereafter if `period != 0`. If this
    /// node was already scheduled or listening anywhere, it is unlinked
    /// first. Among nodes with equal deadlines, dispatch order is FIFO.
    pub fn schedule_after(&self, sched: &Scheduler, delay: Tick, period: Tick) {
        self.cancel();
        critical_section::with(|| {
            let deadline = sched.known_tick().wrapping_add(delay);
            self.set_owner(Owner::Scheduled { deadline, period });
            sched.schedule_after_ordering(self, deadline);
        });
    }

    /// As [`ActionNode::schedule_after`], but among nodes with equal
    /// deadlines this node dispatches before ones already queued (LIFO).
    pub fn schedule_before(&self, sched: &Scheduler, delay: Tick, period: Tick) {
        self.cancel();
        critical_section::with(|| {
            let deadline = sched.known_tick().wrapping_add(delay);
            self.set_owner(Owner::Scheduled { deadline, period });
            sched.schedule_before_ordering(self, deadline);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::Delegate;
    use std::vec::Vec;

    #[test]
    fn s4_scheduler_mixed_deadlines_and_fifo_tie_break() {
        let sched = Scheduler::new();
        sched.start(0);
        let n1 = ActionNode::new();
        let n2 = ActionNode::new();
        let n3 = ActionNode::new();

        let order = core::cell::RefCell::new(Vec::new());
        let cb1 = |_: ()| order.borrow_mut().push("n1");
        let cb2 = |_: ()| order.borrow_mut().push("n2");
        let cb3 = |_: ()| order.borrow_mut().push("n3");
        n1.then(unsafe { Delegate::from_ref(&cb1) });
        n2.then(unsafe { Delegate::from_ref(&cb2) });
        n3.then(unsafe { Delegate::from_ref(&cb3) });

        n1.schedule_after(&sched, 10, 0);
        n2.schedule_after(&sched, 10, 0);
        n3.schedule_after(&sched, 5, 0);

        sched.execute_all(7);
        assert_eq!(*order.borrow(), std::vec!["n3"]);

        sched.execute_all(10);
        assert_eq!(*order.borrow(), std::vec!["n3", "n1", "n2"]);
    }

    #[test]
    fn schedule_before_is_lifo_among_equal_deadlines() {
        let sched = Scheduler::new();
        sched.start(0);
        let a = ActionNode::new();
        let b = ActionNode::new();
        let c = ActionNode::new();

        let order = core::cell::RefCell::new(Vec::new());
        let cb_a = |_: ()| order.borrow_mut().push("a");
        let cb_b = |_: ()| order.borrow_mut().push("b");
        let cb_c = |_: ()| order.borrow_mut().push("c");
        a.then(unsafe { Delegate::from_ref(&cb_a) });
        b.then(unsafe { Delegate::from_ref(&cb_b) });
        c.then(unsafe { Delegate::from_ref(&cb_c) });

        a.schedule_before(&sched, 10, 0);
        b.schedule_before(&sched, 10, 0);
        c.schedule_before(&sched, 10, 0);

        sched.execute_all(10);
        assert_eq!(*order.borrow(), std::vec!["c", "b", "a"]);
    }

    #[test]
    fn s5_periodic_cancel_in_callback_stops_rearming() {
        let sched = Scheduler::new();
        sched.start(0);
        let node = ActionNode::new();
        let node_ptr = &node as *const ActionNode;
        let dispatches = Cell::new(0u32);
        let cb = |_: ()| {
            dispatches.set(dispatches.get() + 1);
            if dispatches.get() == 3 {
                // Cancelling from inside the node's own callback must
                // suppress the periodic rearm this dispatch would
                // otherwise perform on return.
                unsafe { (*node_ptr).cancel() };
            }
        };
        let cb = unsafe { Delegate::from_ref(&cb) };

        node.then(cb);
        node.schedule_after(&sched, 100, 100);

        for t in [100u32, 200, 300, 400, 500] {
            sched.execute_all(t);
            if node.is_scheduled() {
                node.then(cb);
            }
        }
        assert_eq!(dispatches.get(), 3);
        assert!(!node.is_scheduled());
    }

    #[test]
    fn periodic_rearm_is_based_on_dispatch_tick_not_prior_deadline() {
        let sched = Scheduler::new();
        sched.start(0);
        let node = ActionNode::new();
        node.schedule_after(&sched, 100, 100);
        // Late poll at t=250 dispatches once; next deadline should be
        // 250 + 100 = 350, not 100 + 100 = 200, per spec.md's drift policy.
        assert!(sched.execute_one(250));
        assert_eq!(sched.has_next_tick(), Some(350));
    }

    #[test]
    fn has_next_tick_peeks_without_dispatching() {
        let sched = Scheduler::new();
        sched.start(0);
        let node = ActionNode::new();
        node.schedule_after(&sched, 5, 0);
        assert_eq!(sched.has_next_tick(), Some(5));
        assert_eq!(sched.has_next_tick(), Some(5));
        node.explicitly_ignore();
        assert!(sched.execute_one(5));
        assert_eq!(sched.has_next_tick(), None);
    }

    #[test]
    fn rescheduling_moves_a_node_between_schedulers() {
        let a = Scheduler::new();
        let b = Scheduler::new();
        a.start(0);
        b.start(0);
        let node = ActionNode::new();
        node.schedule_after(&a, 10, 0);
        assert!(node.is_scheduled());
        node.schedule_after(&b, 20, 0);
        assert_eq!(a.has_next_tick(), None);
        assert_eq!(b.has_next_tick(), Some(20));
        node.explicitly_ignore();
    }
}

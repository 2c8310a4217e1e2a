//! Double-buffered emission to a dynamic set of [`ActionNode`]s.
//!
//! The buffer-swap-on-emit protocol in `spec.md` §4.K is load-bearing
//! (`spec.md` §9): a callback that re-subscribes to the same multicast
//! while it is being emitted must land in the *other* buffer and run on
//! the next [`Multicast::emit`], never the current one. Coalescing the two
//! chains into one would let a re-subscribing callback observe itself
//! mid-iteration; this module keeps them as two independent
//! [`crate::list`] rings and only ever swaps which one is "active".

use crate::action_node::{ActionNode, Owner};
use crate::critical_section;
use crate::list::{Linked, List, Node};
use core::cell::Cell;

/// A dynamic set of [`ActionNode`]s, each invoked once per [`Multicast::emit`].
pub struct Multicast {
    chains: [Node; 2],
    active: Cell<usize>,
}

// SAFETY: `chains`/`active` are only mutated inside `critical_section::with`.
unsafe impl Sync for Multicast {}

impl Multicast {
    /// Creates a multicast with nothing subscribed.
    pub const fn new() -> Self {
        Multicast {
            chains: [Node::new(), Node::new()],
            active: Cell::new(0),
        }
    }

    fn active_list(&self) -> List<'_> {
        List::new(&self.chains[self.active.get()])
    }

    /// Runs every currently subscribed node once.
    ///
    /// Under a critical section, the active/standby chains are swapped;
    /// the walk then proceeds over the snapshot that was active before the
    /// swap. Each visited node is unlinked and its thenable resolved
    /// outside the critical section (per `spec.md` §5); if the node did
    /// not relink itself during its callback and was not subscribed via
    /// [`ActionNode::listen_once`], it is appended to the (now active)
    /// standby chain for the next `emit`.
    pub fn emit(&self) {
        let snapshot_idx = critical_section::with(|| {
            let snapshot = self.active.get();
            self.active.set(1 - snapshot);
            snapshot
        });
        let snapshot = List::new(&self.chains[snapshot_idx]);
        loop {
            let popped = critical_section::with(|| snapshot.pop_front());
            let Some(node_ptr) = popped else {
                break;
            };
            let node = unsafe { ActionNode::from_node(node_ptr).as_ref() };
            // As in `scheduler::Scheduler::execute_one`, `owner` is left
            // untouched across the callback so that a `cancel()` called from
            // inside it (which overwrites `owner` to `Owner::None`) can be
            // told apart from "the callback did nothing".
            node.thenable().resolver().resolve(());
            critical_section::with(|| {
                if !node.node().is_unlinked() {
                    // Relinked elsewhere (e.g. `listen_subscribe` during its
                    // own call) during the callback; leave it as-is.
                    return;
                }
                match node.owner() {
                    Owner::Listening {
                        remove_after_call: false,
                    } => {
                        self.active_list().push_back(node.node());
                    }
                    _ => node.set_owner(Owner::None),
                }
            });
        }
    }

    /// True iff nothing is currently subscribed to either chain.
    pub fn is_empty(&self) -> bool {
        critical_section::with(|| {
            List::new(&self.chains[0]).is_empty() && List::new(&self.chains[1]).is_empty()
        })
    }
}

impl Default for Multicast {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionNode {
    /// Subscribes this node to `multicast` for exactly one future `emit`,
    /// then automatically unsubscribes. Unlinks this node from any
    /// scheduler/multicast it was previously queued on first.
    pub fn listen_once(&self, multicast: &Multicast) {
        self.cancel();
        critical_section::with(|| {
            self.set_owner(Owner::Listening {
                remove_after_call: true,
            });
            multicast.active_list().push_back(self.node());
        });
    }

    /// Subscribes this node to `multicast` for every future `emit` it is
    /// not unsubscribed from in the meantime. Unlinks this node from any
    /// scheduler/multicast it was previously queued on first.
    pub fn listen_subscribe(&self, multicast: &Multicast) {
        self.cancel();
        critical_section::with(|| {
            self.set_owner(Owner::Listening {
                remove_after_call: false,
            });
            multicast.active_list().push_back(self.node());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::Delegate;
    use std::cell::RefCell;
    use std::vec::Vec;

    #[test]
    fn emit_runs_every_subscriber_once() {
        let mc = Multicast::new();
        let a = ActionNode::new();
        let b = ActionNode::new();
        let calls = RefCell::new(Vec::new());
        let cb_a = |_: ()| calls.borrow_mut().push("a");
        let cb_b = |_: ()| calls.borrow_mut().push("b");
        a.then(unsafe { Delegate::from_ref(&cb_a) });
        b.then(unsafe { Delegate::from_ref(&cb_b) });
        a.listen_once(&mc);
        b.listen_once(&mc);
        mc.emit();
        assert_eq!(*calls.borrow(), std::vec!["a", "b"]);
        assert!(mc.is_empty());
    }

    #[test]
    fn listen_once_does_not_survive_past_the_emit_it_fired_in() {
        let mc = Multicast::new();
        let node = ActionNode::new();
        let calls = Cell::new(0u32);
        let cb = |_: ()| calls.set(calls.get() + 1);
        node.then(unsafe { Delegate::from_ref(&cb) });
        node.listen_once(&mc);
        mc.emit();
        mc.emit();
        assert_eq!(calls.get(), 1);
        assert!(!node.is_listening());
    }

    #[test]
    fn listen_subscribe_survives_across_emits_until_cancelled() {
        let mc = Multicast::new();
        let node = ActionNode::new();
        let calls = Cell::new(0u32);
        let cb = |_: ()| calls.set(calls.get() + 1);
        node.then(unsafe { Delegate::from_ref(&cb) });
        node.listen_subscribe(&mc);
        mc.emit();
        if node.is_listening() {
            node.then(unsafe { Delegate::from_ref(&cb) });
        }
        mc.emit();
        assert_eq!(calls.get(), 2);
        node.cancel();
    }

    #[test]
    fn resubscribing_during_emission_defers_to_the_next_emit() {
        // S11 / spec.md §8 item 11: a callback that calls
        // `listen_subscribe` on the same multicast during emission must
        // not be visited again until the *next* `emit`.
        let mc = Multicast::new();
        let node = ActionNode::new();
        let calls = Cell::new(0u32);
        let node_ptr = &node as *const ActionNode;
        let mc_ptr = &mc as *const Multicast;
        let cb = |_: ()| {
            calls.set(calls.get() + 1);
            unsafe { (*node_ptr).listen_subscribe(&*mc_ptr) };
        };
        node.then(unsafe { Delegate::from_ref(&cb) });
        node.listen_once(&mc);
        mc.emit();
        assert_eq!(calls.get(), 1);
        assert!(node.is_listening());
        node.then(unsafe { Delegate::from_ref(&cb) });
        mc.emit();
        assert_eq!(calls.get(), 2);
        node.cancel();
    }
}

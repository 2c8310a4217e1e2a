//! The schedulable/listenable unit shared by [`crate::scheduler`] and
//! [`crate::multicast`].
//!
//! `spec.md` §4.J/§4.K describe two independent-looking call protocols
//! (scheduling by deadline, listening on a multicast) that turn out to
//! share the same three ingredients: a [`crate::list::Node`] to chain
//! through, a [`Thenable<()>`] to deliver completion, and a "was I put back
//! by my own callback?" check on return. `SPEC_FULL.md` §11 folds both into
//! one `ActionNode` rather than duplicating the reentrancy dance, matching
//! how the source itself defines a single node type used by both.

use core::ptr::NonNull;

use crate::critical_section;
use crate::delegate::Delegate;
use crate::list::{Linked, Node};
use crate::thenable::Thenable;
use crate::tick::Tick;

/// What an [`ActionNode`] is currently doing, and the payload that regime
/// needs (`spec.md` §3's "payload union").
#[derive(Clone, Copy)]
pub(crate) enum Owner {
    /// Not scheduled and not listening.
    None,
    /// Queued in a [`crate::scheduler::Scheduler`] at `deadline`, rearming
    /// every `period` ticks if `period != 0`.
    Scheduled { deadline: Tick, period: Tick },
    /// Queued on a [`crate::multicast::Multicast`]'s pending chain.
    Listening { remove_after_call: bool },
}

/// A chainable unit that can be scheduled at a tick deadline or subscribed
/// to a multicast, per `spec.md` §3/§4.J/§4.K.
///
/// `ActionNode` owns no callback storage of its own beyond its
/// [`Thenable<()>`]: attach a consumer with [`ActionNode::set`] or
/// [`ActionNode::then`] the same way any other thenable is used.
#[repr(C)]
pub struct ActionNode {
    link: Node,
    thenable: Thenable<()>,
    owner: core::cell::Cell<Owner>,
}

unsafe impl Linked for ActionNode {
    fn node(&self) -> &Node {
        &self.link
    }
}

impl ActionNode {
    /// Creates a fresh, unscheduled, non-listening node.
    pub const fn new() -> Self {
        ActionNode {
            link: Node::new(),
            thenable: Thenable::new(),
            owner: core::cell::Cell::new(Owner::None),
        }
    }

    pub(crate) fn owner(&self) -> Owner {
        self.owner.get()
    }

    pub(crate) fn set_owner(&self, owner: Owner) {
        self.owner.set(owner);
    }

    pub(crate) fn thenable(&self) -> &Thenable<()> {
        &self.thenable
    }

    pub(crate) unsafe fn from_node(node: NonNull<Node>) -> NonNull<ActionNode> {
        node.cast()
    }

    /// Registers the completion consumer, discarding any stored result.
    /// See [`Thenable::set`].
    pub fn set(&self, cb: Delegate<(), ()>) {
        self.thenable.set(cb);
    }

    /// Registers the completion consumer; fires synchronously if a result
    /// is already stored. See [`Thenable::then`].
    pub fn then(&self, cb: Delegate<(), ()>) {
        self.thenable.then(cb);
    }

    /// Attaches a no-op consumer, draining any stored completion.
    pub fn explicitly_ignore(&self) {
        self.thenable.explicitly_ignore();
    }

    /// Unlinks this node from whatever it is scheduled/listening on, clears
    /// its period, and clears its owner. If called from inside this node's
    /// own callback, this suppresses the periodic rearm / multicast
    /// re-subscription that would otherwise happen on return.
    pub fn cancel(&self) {
        critical_section::with(|| {
            self.link.unlink();
            self.owner.set(Owner::None);
        });
    }

    /// True iff this node is currently queued in a scheduler.
    pub fn is_scheduled(&self) -> bool {
        matches!(self.owner.get(), Owner::Scheduled { .. })
    }

    /// True iff this node is currently queued on a multicast.
    pub fn is_listening(&self) -> bool {
        matches!(self.owner.get(), Owner::Listening { .. })
    }
}

impl Default for ActionNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActionNode {
    fn drop(&mut self) {
        self.link.assert_unlinked_on_drop();
    }
}

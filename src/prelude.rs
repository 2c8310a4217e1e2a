//! Common re-exports, in the idiom of `lifo`'s crate-root `pool` re-export
//! of `singleton::Pool` (`SPEC_FULL.md` §11).
//!
//! `use corert::prelude::*;` brings the types most call sites need into
//! scope without enumerating every module path.

pub use crate::action_node::ActionNode;
pub use crate::coroutine::{Coroutine, CoroutineState};
pub use crate::critical_section;
pub use crate::delegate::Delegate;
pub use crate::lifetime::Lifetime;
pub use crate::list::{Linked, List, Node};
pub use crate::multicast::Multicast;
pub use crate::pool::Pool;
pub use crate::scheduler::Scheduler;
pub use crate::thenable::{Thenable, ThenableToResolve};
pub use crate::tick::Tick;
pub use crate::timer::{PeriodicTimer, SimpleTimer};

//! A header-only-style, dependency-free cooperative real-time runtime for
//! microcontrollers.
//!
//! This crate has no required heap, no preemption, and no thread migration:
//! every primitive here is driven by the user calling into it (resuming a
//! coroutine, dispatching a scheduler, emitting a multicast) from a single
//! thread of execution, the same cooperative model `cortex-m-rtfm` applies
//! to interrupt-priority dispatch, generalized here to plain polling.
//!
//! # Layout
//!
//! Leaf primitives first, composed upward:
//!
//! - [`critical_section`] — the exclusion primitive every stateful module
//!   below is built on.
//! - [`list`] — the intrusive doubly-linked ring every chaining structure
//!   in this crate threads through.
//! - [`pool`] — a fixed-capacity, fixed-stride block allocator with a
//!   corruption-guarded free list.
//! - [`lifetime`] — in-place construction/destruction of a single optional
//!   value in caller-owned storage.
//! - [`delegate`] — a two-word, non-owning callable reference.
//! - [`thenable`] — a one-shot producer/consumer rendezvous slot.
//! - [`tick`] — wraparound-safe ordering over an unsigned tick counter.
//! - [`timer`] — one-shot and periodic deadline checks built on [`tick`].
//! - [`trampoline`] — turns a capturing closure into a bare `fn` pointer
//!   via a pre-reserved static slot pool.
//! - [`action_node`] — the schedulable/listenable unit shared by
//!   [`scheduler`] and [`multicast`].
//! - [`scheduler`] — time-ordered dispatch of action nodes.
//! - [`multicast`] — reentrant-safe emission to a dynamic set of action
//!   nodes.
//! - [`coroutine`] — stackless, resume-label-based suspendable computation.
//! - [`task`] — a coroutine whose yields/awaits are delivered through a
//!   thenable.
//! - [`error`] — the shared panic-tag taxonomy and handler indirection.
//! - [`config`] — the runtime-configurable subset of the component list
//!   above (presently, only the panic handler).
//! - [`prelude`] — the common re-exports, for `use corert::prelude::*;`.
//!
//! # Cargo features
//!
//! - `critical-section` — implements [`critical_section::with`] on top of
//!   the `critical-section` crate (interrupt masking / a global lock on
//!   real hardware) instead of the default single-threaded no-op guard.
//! - `stats` — enables [`scheduler::GapMonitor`]'s windowed-average sample
//!   ring, backed by `heapless::Vec`.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

pub mod action_node;
pub mod config;
pub mod coroutine;
pub mod critical_section;
pub mod delegate;
pub mod error;
pub mod lifetime;
pub mod list;
pub mod multicast;
pub mod pool;
pub mod prelude;
pub mod scheduler;
pub mod task;
pub mod thenable;
pub mod tick;
pub mod timer;
pub mod trampoline;

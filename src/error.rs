//! The crate's single point of contract-violation termination.
//!
//! Every fatal condition described by the error taxonomy (pool corruption,
//! double-construction, resuming a finished coroutine, trampoline
//! exhaustion, ...) flows through [`fail`]. By default this expands to
//! [`core::panic!`]; a firmware image may instead install its own handler
//! with [`set_handler`] (for example one that resets the MCU or blinks an
//! LED pattern keyed to the tag) before any of the other modules are used.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Identifies which component raised a fatal contract violation.
///
/// These match the single-character tags in the error taxonomy: a block
/// freed into the wrong pool or a double-construct/empty-destroy on a
/// [`crate::lifetime::Lifetime`] cell (`M`), a task resumed out of turn
/// (`T`), a coroutine resumed after it finished (`C`), trampoline slot
/// exhaustion or reuse after disposal (`B`), and a chain node destroyed
/// while still linked (no letter is assigned in the source; this crate
/// uses `Chain`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PanicTag {
    /// Memory/lifetime contract violation (`'M'`).
    Memory,
    /// Task state-machine contract violation (`'T'`).
    Task,
    /// Coroutine resumed after completion (`'C'`).
    Coroutine,
    /// Trampoline pool exhaustion or reuse after disposal (`'B'`).
    Trampoline,
    /// A chain node was dropped or re-initialized while still linked.
    Chain,
}

impl PanicTag {
    /// The single-character tag used in the error taxonomy table.
    pub fn as_char(self) -> char {
        match self {
            PanicTag::Memory => 'M',
            PanicTag::Task => 'T',
            PanicTag::Coroutine => 'C',
            PanicTag::Trampoline => 'B',
            PanicTag::Chain => '-',
        }
    }
}

/// Signature of a user-installed panic handler.
pub type Handler = fn(PanicTag, &str) -> !;

// A `fn` pointer is `Copy` and fits in a `usize`; we store it racily behind
// an `AtomicUsize` rather than reaching for a `Mutex<Option<Handler>>` so
// that `fail` itself never needs a critical section (it may be called from
// inside one).
static HANDLER: AtomicUsize = AtomicUsize::new(0);

/// Installs a handler invoked by every fatal condition in this crate.
///
/// The default (no handler installed) surfaces violations via
/// [`core::panic!`]. Install a handler once, early in `main`, before any
/// other part of the runtime is exercised.
pub fn set_handler(handler: Handler) {
    HANDLER.store(handler as usize, Ordering::Release);
}

/// Raises a fatal contract violation, tagged per the error taxonomy.
///
/// Never returns. Diverges through the installed [`Handler`], or through
/// [`core::panic!`] if none was installed.
#[cold]
#[inline(never)]
pub fn fail(tag: PanicTag, msg: &str) -> ! {
    let ptr = HANDLER.load(Ordering::Acquire);
    if ptr != 0 {
        // SAFETY: the only value ever stored is a `Handler` passed to
        // `set_handler`, round-tripped through `usize`.
        let handler: Handler = unsafe { core::mem::transmute(ptr) };
        handler(tag, msg)
    } else {
        panic!("[{}] {}", tag.as_char(), msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `set_handler` installs a process-wide handler, so it is exercised in
    // the single-threaded `tests/panic_handler.rs` integration test instead
    // of here: this crate's unit tests run interleaved in one binary and
    // must not risk clobbering each other's `should_panic` expectations.

    #[test]
    fn tag_chars_match_taxonomy() {
        assert_eq!(PanicTag::Memory.as_char(), 'M');
        assert_eq!(PanicTag::Task.as_char(), 'T');
        assert_eq!(PanicTag::Coroutine.as_char(), 'C');
        assert_eq!(PanicTag::Trampoline.as_char(), 'B');
    }
}

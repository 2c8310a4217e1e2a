//! Stackless, resume-label-based coroutines.
//!
//! `spec.md` §4.H describes the source's mechanism: a `switch` over an
//! integer resume label, with `yield` rewriting the label and returning,
//! and the restriction that `yield` cannot appear nested inside another
//! `switch`-like construct the implementation uses to dispatch resumption.
//! A hand-written `match` in Rust has the identical restriction (you cannot
//! `return` out of one match arm and later jump back into the middle of
//! it), so this module does not try to hide that restriction — instead
//! [`coroutine!`] generates the label `match` for you from a flat list of
//! `label => { .. }` arms, the same way [`crate::trampoline`]'s dispatch
//! macro generates a flat `match` over slot indices rather than nested
//! control flow. Declaring two labels is then no different from declaring
//! two non-nested `match` arms; the restriction simply never arises.

use crate::error::{fail, PanicTag};

/// The integer resume label threaded through a coroutine's state.
pub type Label = u32;

/// The label a freshly constructed coroutine starts at.
pub const INITIAL_LABEL: Label = 0;

/// The sentinel label a coroutine is set to after [`Coroutine::resume`]
/// returns [`CoroutineState::Finished`]. Resuming again is a panic.
pub const FINISHED_LABEL: Label = Label::MAX;

/// The result of one [`Coroutine::resume`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoroutineState<Y> {
    /// The coroutine suspended, yielding `Y`; it can be resumed again.
    Yielded(Y),
    /// The coroutine ran to completion, producing a final `Y`; resuming
    /// again is a panic.
    Finished(Y),
}

impl<Y> CoroutineState<Y> {
    /// The yielded or final value, by reference.
    pub fn value(&self) -> &Y {
        match self {
            CoroutineState::Yielded(v) => v,
            CoroutineState::Finished(v) => v,
        }
    }

    /// True iff this is [`CoroutineState::Yielded`] (the coroutine can
    /// still be resumed).
    pub fn is_yielded(&self) -> bool {
        matches!(self, CoroutineState::Yielded(_))
    }
}

/// A resumable, stackless computation, per `spec.md` §4.H.
///
/// Implementations are expected to be generated by [`coroutine!`]; the
/// trait is exposed directly for the rare case of a hand-written resume
/// body with only one or two labels, where the macro's bookkeeping would
/// outweigh writing the `match` by hand.
pub trait Coroutine {
    /// The type produced by every `yield` and by the final `stop`.
    type Yield;

    /// Resumes the coroutine from its saved label. Panics if the
    /// coroutine already finished.
    fn resume(&mut self) -> CoroutineState<Self::Yield>;

    /// True after a `stop`; further [`Coroutine::resume`] calls panic.
    fn finished(&self) -> bool;
}

/// Transitions `self.__label` to `$label` and returns
/// [`CoroutineState::Yielded`] with `$value`, for use inside a
/// [`coroutine!`] resume arm.
#[macro_export]
macro_rules! yield_now {
    ($self:ident, $label:expr, $value:expr) => {{
        $self.__label = $label;
        return $crate::coroutine::CoroutineState::Yielded($value);
    }};
}

/// Marks the coroutine finished and returns [`CoroutineState::Finished`]
/// with `$value`, for use inside a [`coroutine!`] resume arm.
#[macro_export]
macro_rules! stop_now {
    ($self:ident, $value:expr) => {{
        $self.__label = $crate::coroutine::FINISHED_LABEL;
        return $crate::coroutine::CoroutineState::Finished($value);
    }};
}

/// Declares a coroutine state struct and its resume body as a flat list of
/// integer-labelled arms, per `spec.md` §4.H.
///
/// Each arm is a plain block that ends by calling either
/// [`yield_now!`]`(self, next_label, value)` or
/// [`stop_now!`]`(self, value)`; state that must survive across a yield is
/// declared as a struct field, never as a local inside an arm (the
/// underlying mechanism discards the activation between resumes, exactly
/// as `spec.md` §4.L requires of task state).
///
/// ```ignore
/// coroutine! {
///     pub struct Counter: Coroutine<Yield = u32> {
///         n: u32 = 0,
///     }
///
///     resume(self) {
///         0 => {
///             self.n = 1;
///             yield_now!(self, 1, self.n);
///         }
///         1 => {
///             self.n += 1;
///             if self.n < 3 {
///                 yield_now!(self, 1, self.n);
///             }
///             stop_now!(self, self.n);
///         }
///     }
/// }
/// ```
#[macro_export]
macro_rules! coroutine {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : Coroutine<Yield = $yield_ty:ty> {
            $( $field:ident : $field_ty:ty = $field_init:expr ),* $(,)?
        }

        resume($self:ident) {
            $( $label:literal => $body:block )*
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            __label: $crate::coroutine::Label,
            $( $field: $field_ty ),*
        }

        impl $name {
            /// Creates a coroutine at its initial resume label.
            $vis fn new() -> Self {
                $name {
                    __label: $crate::coroutine::INITIAL_LABEL,
                    $( $field: $field_init ),*
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $crate::coroutine::Coroutine for $name {
            type Yield = $yield_ty;

            fn resume(&mut $self) -> $crate::coroutine::CoroutineState<Self::Yield> {
                if $self.__label == $crate::coroutine::FINISHED_LABEL {
                    $crate::error::fail(
                        $crate::error::PanicTag::Coroutine,
                        "resume called on a finished coroutine",
                    );
                }
                #[allow(unreachable_code)]
                match $self.__label {
                    $( $label => $body )*
                    _ => $crate::error::fail(
                        $crate::error::PanicTag::Coroutine,
                        "coroutine resumed at an unknown label",
                    ),
                }
            }

            fn finished(&self) -> bool {
                self.__label == $crate::coroutine::FINISHED_LABEL
            }
        }
    };
}

/// Panics; used by hand-written [`Coroutine`] impls that want the same
/// "resume after finish" error the macro-generated ones raise.
pub fn panic_if_finished(finished: bool) {
    if finished {
        fail(PanicTag::Coroutine, "resume called on a finished coroutine");
    }
}

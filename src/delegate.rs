//! A two-word, non-owning, polymorphic callable reference.
//!
//! `Delegate<A, R>` plays the role of `lifo::Pool<T>`'s `Box<T, State>`
//! typestate trick turned inside out: instead of a typestate encoding
//! "constructed or not", a single payload word is *tagged by construction
//! site* (object address vs. raw function pointer) and a matching
//! trampoline function pointer knows how to interpret it. Per `spec.md`
//! §9's design note, this is the idiomatic stand-in for the source's
//! tagged two-word payload — a sum type would be used directly in a
//! language that had one; here the "sum" is implicit in which trampoline
//! was installed.
//!
//! `spec.md` §4.E describes a delegate of arbitrary signature `R(Args...)`.
//! This crate represents `Args...` as a single type parameter `A` (use
//! `()` for a nullary callback, a tuple for more than one argument), which
//! covers every call site in this crate (a thenable's consumer takes one
//! value or none) without requiring variadic generics.

use core::cmp::Ordering;

/// A two-word callable reference to something matching `fn(A) -> R`,
/// without owning what it points to.
///
/// `size_of::<Delegate<A, R>>() == 2 * size_of::<usize>()`, regardless of
/// `A` and `R`, per `spec.md` §4.E's size contract.
pub struct Delegate<A, R = ()> {
    trampoline: unsafe fn(usize, A) -> R,
    payload: usize,
}

impl<A, R> Clone for Delegate<A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, R> Copy for Delegate<A, R> {}

impl<A, R> PartialEq for Delegate<A, R> {
    /// Byte-wise comparison of the two words, per `spec.md` §4.E. This
    /// crate does *not* normalize different construction sites for "the
    /// same" target to a canonical encoding (`spec.md` §9 open question) —
    /// two delegates built from the same object via [`BoundMethod`] and
    /// [`BoundFn`] compare unequal, since their trampolines differ.
    fn eq(&self, other: &Self) -> bool {
        self.trampoline as usize == other.trampoline as usize && self.payload == other.payload
    }
}

impl<A, R> Eq for Delegate<A, R> {}

impl<A, R> PartialOrd for Delegate<A, R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A, R> Ord for Delegate<A, R> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.trampoline as usize, self.payload).cmp(&(other.trampoline as usize, other.payload))
    }
}

fn null_trampoline<A, R>(_payload: usize, _args: A) -> R {
    panic!("called a null delegate")
}

impl<A, R> Delegate<A, R> {
    /// A delegate wrapping a null raw function pointer: the only
    /// representation of "no target" per `spec.md` §4.E. Calling it
    /// panics; it exists to be compared against (`is_null`), mirroring
    /// the sentinel role `spec.md` §4.F assigns the "no consumer" state.
    pub const fn null() -> Self {
        Delegate {
            trampoline: null_trampoline::<A, R>,
            payload: 0,
        }
    }

    /// True iff this is the [`Delegate::null`] sentinel.
    pub fn is_null(&self) -> bool {
        self.trampoline as usize == null_trampoline::<A, R> as usize
    }

    /// Binds a non-owning reference to any value whose call operator
    /// matches `fn(A) -> R`.
    ///
    /// # Safety
    /// The caller must ensure `f` outlives every call made through the
    /// returned delegate.
    pub unsafe fn from_ref<F>(f: &F) -> Self
    where
        F: Fn(A) -> R,
    {
        unsafe fn trampoline<F, A, R>(payload: usize, args: A) -> R
        where
            F: Fn(A) -> R,
        {
            let f = unsafe { &*(payload as *const F) };
            f(args)
        }

        Delegate {
            trampoline: trampoline::<F, A, R>,
            payload: f as *const F as usize,
        }
    }

    /// Builds a delegate around a captureless temporary for synchronous,
    /// one-shot use.
    ///
    /// # Safety
    /// The returned delegate must not outlive the expression that produced
    /// `f`; it borrows `f`'s address without tracking its lifetime.
    pub unsafe fn unstorable<F>(f: &F) -> Self
    where
        F: Fn(A) -> R,
    {
        unsafe { Self::from_ref(f) }
    }

    /// Wraps a plain function pointer. `trampoline` dispatches directly to
    /// it; the payload word is unused.
    pub fn from_fn(f: fn(A) -> R) -> Self {
        unsafe fn trampoline<A, R>(payload: usize, args: A) -> R {
            let f: fn(A) -> R = unsafe { core::mem::transmute(payload) };
            f(args)
        }

        Delegate {
            trampoline: trampoline::<A, R>,
            payload: f as usize,
        }
    }
}

/// A `(receiver address, method)` pair that owns just enough storage to
/// back a [`Delegate`] built from a bound method, per `spec.md` §4.E
/// construction mode 3 ("statically bound via a builder").
///
/// A single payload word cannot carry both the receiver's address and the
/// method's address, so `spec.md`'s "statically bound via a builder"
/// phrasing is realized as this small non-owning record: it co-locates
/// `obj` and `method`, and the resulting [`Delegate`]'s payload word is
/// simply `&BoundMethod` (one address standing in for the pair, the same
/// trick [`BoundFn`] uses for construction mode 4).
///
/// Unlike a plain `Delegate`, a `BoundMethod` must be kept alive by the
/// caller (typically alongside the receiver) for as long as delegates
/// built from it are used — it is the non-owning record the trampoline
/// reads `obj` and `method` back out of.
pub struct BoundMethod<T, A, R = ()> {
    obj: *const T,
    method: fn(&T, A) -> R,
}

impl<T, A, R> BoundMethod<T, A, R> {
    /// Binds `obj`'s address to `method`, to be turned into a [`Delegate`]
    /// with [`BoundMethod::delegate`].
    ///
    /// # Safety
    /// `obj` must outlive every [`Delegate`] built from this binder.
    pub unsafe fn new(obj: &T, method: fn(&T, A) -> R) -> Self {
        BoundMethod { obj, method }
    }

    /// Builds a [`Delegate`] that calls `method(obj, args)`.
    ///
    /// # Safety
    /// The returned delegate must not outlive `self`.
    pub unsafe fn delegate(&self) -> Delegate<A, R> {
        unsafe fn trampoline<T, A, R>(payload: usize, args: A) -> R {
            let bound = unsafe { &*(payload as *const BoundMethod<T, A, R>) };
            (bound.method)(unsafe { &*bound.obj }, args)
        }

        Delegate {
            trampoline: trampoline::<T, A, R>,
            payload: self as *const Self as usize,
        }
    }
}

/// A `(receiver address, free function taking the receiver)` pair, for
/// `spec.md` §4.E construction mode 4.
pub struct BoundFn<T, A, R = ()> {
    obj: *const T,
    f: fn(&T, A) -> R,
}

impl<T, A, R> BoundFn<T, A, R> {
    /// # Safety
    /// `obj` must outlive every [`Delegate`] built from this binder.
    pub unsafe fn new(obj: &T, f: fn(&T, A) -> R) -> Self {
        BoundFn { obj, f }
    }

    /// # Safety
    /// The returned delegate must not outlive `self`.
    pub unsafe fn delegate(&self) -> Delegate<A, R> {
        unsafe fn trampoline<T, A, R>(payload: usize, args: A) -> R {
            let bound = unsafe { &*(payload as *const BoundFn<T, A, R>) };
            (bound.f)(unsafe { &*bound.obj }, args)
        }

        Delegate {
            trampoline: trampoline::<T, A, R>,
            payload: self as *const Self as usize,
        }
    }
}

impl<A, R> Delegate<A, R> {
    /// Invokes the delegate.
    pub fn call(&self, args: A) -> R {
        unsafe { (self.trampoline)(self.payload, args) }
    }
}

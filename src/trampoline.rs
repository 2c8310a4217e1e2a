//! Turns a capturing closure into a bare function pointer, without a heap.
//!
//! A legacy C callback slot (an ISR vector, `signal()`, an old HAL's
//! `void (*)(void)` registration) has no room for a context word — it is
//! exactly one pointer, a plain `fn`, nothing else. [`crate::delegate`]
//! solves the "callable reference" problem everywhere *this* crate controls
//! the call site, by spending a second word on payload; this module solves
//! it for call sites that don't give you that second word.
//!
//! The trick (`spec.md` §4.I): reserve `N` slots of static storage for one
//! specific closure *type* `F`, ahead of time, and generate `N` distinct
//! monomorphizations of a trampoline function — one per slot index — each
//! hardcoding which slot it reads from at the type level via a `const`
//! generic. Each monomorphization is a genuinely distinct function item
//! with its own address, so the bare `fn(Args) -> R` pointer returned by
//! [`alloc`] carries the slot identity for free, the same way
//! `lifo::pool!` (see `examples/japaric-lifo/src/singleton.rs`) generates
//! one hidden static `Pool<T>` per named pool type rather than taking `T`
//! as a runtime value.
//!
//! `spec.md` allows a compile-time-arbitrary reservation count `N`; this
//! crate bounds it to [`MAX_RESERVATION`] slots so the const-generic
//! dispatch table in [`trampoline_for`]/[`trampoline_for_extended`] can be
//! written as a plain `match` over slot index, without reaching for an
//! unstable `generic_const_exprs` feature or an extra macro-expansion
//! dependency. See `DESIGN.md` for the tradeoff.

use core::cell::{Cell, UnsafeCell};
use core::mem::MaybeUninit;

use crate::critical_section;
use crate::error::{fail, PanicTag};

/// Upper bound on a single trampoline pool's reservation count.
pub const MAX_RESERVATION: usize = 16;

struct Slot<F> {
    closure: UnsafeCell<MaybeUninit<F>>,
    next_free: Cell<Option<usize>>,
    occupied: Cell<bool>,
}

impl<F> Slot<F> {
    const fn uninit() -> Self {
        Slot {
            closure: UnsafeCell::new(MaybeUninit::uninit()),
            next_free: Cell::new(None),
            occupied: Cell::new(false),
        }
    }
}

/// Static backing storage for up to [`MAX_RESERVATION`] closures of type
/// `F`. Built by the [`trampoline!`]/[`trampoline_extended!`] macros rather
/// than used directly.
pub struct Trampolines<F> {
    slots: UnsafeCell<[Slot<F>; MAX_RESERVATION]>,
    free: Cell<Option<usize>>,
    initialized: Cell<bool>,
}

// SAFETY: every mutation happens inside `critical_section::with`.
unsafe impl<F> Sync for Trampolines<F> where F: Send {}

impl<F> Trampolines<F> {
    /// Creates an empty pool. Call [`Trampolines::ensure_initialized`] (or
    /// go through [`alloc`]/[`alloc_extended`], which do so implicitly)
    /// before using it.
    pub const fn new() -> Self {
        Trampolines {
            slots: UnsafeCell::new([const { Slot::uninit() }; MAX_RESERVATION]),
            free: Cell::new(None),
            initialized: Cell::new(false),
        }
    }

    fn ensure_initialized(&self, reservation: usize) {
        if self.initialized.get() {
            return;
        }
        assert!(
            reservation >= 1 && reservation <= MAX_RESERVATION,
            "trampoline reservation must be between 1 and MAX_RESERVATION"
        );
        critical_section::with(|| {
            if self.initialized.get() {
                return;
            }
            let slots = unsafe { &*self.slots.get() };
            let mut next = None;
            for i in (0..reservation).rev() {
                slots[i].next_free.set(next);
                next = Some(i);
            }
            self.free.set(next);
            self.initialized.set(true);
        });
    }

    fn take_free_slot(&self) -> Option<usize> {
        critical_section::with(|| {
            let i = self.free.get()?;
            let slots = unsafe { &*self.slots.get() };
            self.free.set(slots[i].next_free.get());
            slots[i].occupied.set(true);
            Some(i)
        })
    }

    fn push_free_slot(&self, i: usize) {
        critical_section::with(|| {
            let slots = unsafe { &*self.slots.get() };
            slots[i].next_free.set(self.free.get());
            slots[i].occupied.set(false);
            self.free.set(Some(i));
        });
    }

    fn is_occupied(&self, i: usize) -> bool {
        let slots = unsafe { &*self.slots.get() };
        slots[i].occupied.get()
    }

    unsafe fn slot_ptr(&self, i: usize) -> *mut F {
        let slots = &*self.slots.get();
        slots[i].closure.get() as *mut F
    }
}

/// Implemented by the zero-sized marker type a [`trampoline!`] invocation
/// generates, binding a closure type to its one hidden static pool.
pub trait SingleShotMarker: Sized + 'static {
    /// Argument type delivered to the closure.
    type Args;
    /// Value returned by the closure.
    type Output;
    /// The exact closure type reserved storage for. Every allocation
    /// through this marker must supply a value of this type.
    type Closure: FnOnce(Self::Args) -> Self::Output + 'static;
    /// Compile-time slot count, `1..=`[`MAX_RESERVATION`].
    const RESERVATION: usize;
    /// The hidden static pool this marker's trampolines read from.
    fn pool() -> &'static Trampolines<Self::Closure>;
}

/// A handle an [`ExtendedMarker`] closure uses to end its own trampoline's
/// lifetime.
///
/// Per `spec.md` §4.I's extended policy: the trampoline stays resident
/// (available for further legacy-API calls) until the closure calls
/// [`Disposer::dispose`] from inside itself, at which point the slot is
/// torn down after the current call returns.
pub struct Disposer {
    disposed: Cell<bool>,
}

impl Disposer {
    /// Requests that this trampoline's slot be torn down once the current
    /// call returns. Calling this more than once in the same call is a
    /// no-op.
    pub fn dispose(&self) {
        self.disposed.set(true);
    }
}

/// Implemented by the marker type [`trampoline_extended!`] generates.
pub trait ExtendedMarker: Sized + 'static {
    /// Argument type delivered to the closure.
    type Args;
    /// Value returned by the closure.
    type Output;
    /// The closure type reserved storage for. Unlike [`SingleShotMarker`],
    /// this closure may be called more than once before disposal, so it is
    /// `FnMut`.
    type Closure: FnMut(&Disposer, Self::Args) -> Self::Output + 'static;
    /// Compile-time slot count, `1..=`[`MAX_RESERVATION`].
    const RESERVATION: usize;
    /// The hidden static pool this marker's trampolines read from.
    fn pool() -> &'static Trampolines<Self::Closure>;
}

unsafe fn trampoline_single<M, const I: usize>(args: M::Args) -> M::Output
where
    M: SingleShotMarker,
{
    let pool = M::pool();
    if !pool.is_occupied(I) {
        fail(
            PanicTag::Trampoline,
            "single-shot trampoline invoked on an empty slot",
        );
    }
    // Move the closure to the stack and free the slot *before* calling it,
    // per spec.md §4.I: this makes it safe for the closure to allocate
    // another trampoline of the same marker reentrantly.
    let closure = critical_section::with(|| {
        let p = unsafe { pool.slot_ptr(I) };
        let value = unsafe { p.read() };
        pool.push_free_slot(I);
        value
    });
    closure(args)
}

unsafe fn trampoline_extended<M, const I: usize>(args: M::Args) -> M::Output
where
    M: ExtendedMarker,
{
    let pool = M::pool();
    if !pool.is_occupied(I) {
        fail(PanicTag::Trampoline, "disposed trampoline re-invoked");
    }
    let disposer = Disposer {
        disposed: Cell::new(false),
    };
    let p = unsafe { pool.slot_ptr(I) };
    let result = (unsafe { &mut *p })(&disposer, args);
    if disposer.disposed.get() {
        critical_section::with(|| {
            unsafe { core::ptr::drop_in_place(p) };
            pool.push_free_slot(I);
        });
    }
    result
}

macro_rules! dispatch_table {
    ($helper:ident, $trampoline:ident, $bound:ident) => {
        fn $helper<M: $bound>(i: usize) -> fn(M::Args) -> M::Output {
            match i {
                0 => $trampoline::<M, 0>,
                1 => $trampoline::<M, 1>,
                2 => $trampoline::<M, 2>,
                3 => $trampoline::<M, 3>,
                4 => $trampoline::<M, 4>,
                5 => $trampoline::<M, 5>,
                6 => $trampoline::<M, 6>,
                7 => $trampoline::<M, 7>,
                8 => $trampoline::<M, 8>,
                9 => $trampoline::<M, 9>,
                10 => $trampoline::<M, 10>,
                11 => $trampoline::<M, 11>,
                12 => $trampoline::<M, 12>,
                13 => $trampoline::<M, 13>,
                14 => $trampoline::<M, 14>,
                15 => $trampoline::<M, 15>,
                _ => fail(PanicTag::Trampoline, "slot index exceeds MAX_RESERVATION"),
            }
        }
    };
}

dispatch_table!(trampoline_for, trampoline_single, SingleShotMarker);
dispatch_table!(trampoline_for_extended, trampoline_extended, ExtendedMarker);

/// Moves `closure` into a free slot of `M`'s pool and returns a bare
/// function pointer that, when called, runs it exactly once.
///
/// # Panics
/// Panics with [`PanicTag::Trampoline`] if every reserved slot is in use.
pub fn alloc<M: SingleShotMarker>(closure: M::Closure) -> fn(M::Args) -> M::Output {
    let pool = M::pool();
    pool.ensure_initialized(M::RESERVATION);
    let index = pool
        .take_free_slot()
        .unwrap_or_else(|| fail(PanicTag::Trampoline, "trampoline slot exhaustion"));
    unsafe { pool.slot_ptr(index).write(closure) };
    trampoline_for::<M>(index)
}

/// Moves `closure` into a free slot of `M`'s pool and returns a bare
/// function pointer that may be called repeatedly until the closure calls
/// [`Disposer::dispose`] on itself.
///
/// # Panics
/// Panics with [`PanicTag::Trampoline`] if every reserved slot is in use.
pub fn alloc_extended<M: ExtendedMarker>(closure: M::Closure) -> fn(M::Args) -> M::Output {
    let pool = M::pool();
    pool.ensure_initialized(M::RESERVATION);
    let index = pool
        .take_free_slot()
        .unwrap_or_else(|| fail(PanicTag::Trampoline, "trampoline slot exhaustion"));
    unsafe { pool.slot_ptr(index).write(closure) };
    trampoline_for_extended::<M>(index)
}

/// Declares a marker type binding one closure type to a single-shot
/// trampoline pool, in the idiom of `lifo::pool!`
/// (`examples/japaric-lifo/src/singleton.rs`).
///
/// ```ignore
/// trampoline! {
///     /// Doc comment carried through to the generated type.
///     pub Once: FnOnce(u32) -> () as MyClosure, reservation = 4
/// }
/// // `MyClosure` is a concrete closure type, e.g. a `Box<dyn FnOnce(u32)>`
/// // or, for a no-heap call site, a named struct implementing `FnOnce`.
/// let f: fn(u32) = trampoline::alloc::<Once>(move |x| { ... });
/// ```
#[macro_export]
macro_rules! trampoline {
    ($(#[$meta:meta])* $vis:vis $name:ident : FnOnce($args:ty) -> $ret:ty as $closure:ty, reservation = $n:expr) => {
        $(#[$meta])*
        $vis struct $name;

        impl $crate::trampoline::SingleShotMarker for $name {
            type Args = $args;
            type Output = $ret;
            type Closure = $closure;
            const RESERVATION: usize = $n;

            fn pool() -> &'static $crate::trampoline::Trampolines<Self::Closure> {
                static POOL: $crate::trampoline::Trampolines<$closure> =
                    $crate::trampoline::Trampolines::new();
                &POOL
            }
        }
    };
}

/// Declares a marker type binding one closure type to an extended-lifetime
/// trampoline pool. See [`trampoline!`] for the single-shot form.
#[macro_export]
macro_rules! trampoline_extended {
    ($(#[$meta:meta])* $vis:vis $name:ident : FnMut($args:ty) -> $ret:ty as $closure:ty, reservation = $n:expr) => {
        $(#[$meta])*
        $vis struct $name;

        impl $crate::trampoline::ExtendedMarker for $name {
            type Args = $args;
            type Output = $ret;
            type Closure = $closure;
            const RESERVATION: usize = $n;

            fn pool() -> &'static $crate::trampoline::Trampolines<Self::Closure> {
                static POOL: $crate::trampoline::Trampolines<$closure> =
                    $crate::trampoline::Trampolines::new();
                &POOL
            }
        }
    };
}

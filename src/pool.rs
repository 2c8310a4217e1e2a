//! A fixed-capacity, fixed-stride block allocator with a corruption guard.
//!
//! This is the direct descendant of `lifo::Pool<T>`: a singly-linked free
//! list threaded through the slots themselves, a typestate-free `alloc`/
//! `free` pair, and typed placement construction on top of raw block
//! allocation. Two things changed on the way from the teacher crate to this
//! one:
//!
//! - `lifo::Pool<T>` is grown from an externally supplied `'static` byte
//!   slice and is specialized to one element type `T`. `spec.md` §3/§4.C
//!   describes a pool that *owns* its `C * N` byte region and can host any
//!   type no larger than the block stride `C` — so capacity and block size
//!   are const generics here (`Pool<C, N>`) and the storage lives inline.
//! - `lifo::Pool<T>` uses a CAS (Treiber-stack) free list so it can be
//!   `Sync` without a critical section on LL/SC architectures. This pool
//!   instead mutates its free list inside [`crate::critical_section::with`],
//!   per `spec.md` §4.C's "thread-safety" clause; see `DESIGN.md` for why the
//!   CAS path was dropped rather than ported.

use core::cell::{Cell, UnsafeCell};
use core::mem;
use core::ptr::NonNull;

use crate::critical_section;
use crate::error::{fail, PanicTag};

/// Fixed magic number stamped into every pool instance and checked by
/// [`Pool::free_raw`] before a block is accepted back, per `spec.md` §4.C.
const POOL_MAGIC: usize = 0x504F_4F4C; // ASCII "POOL"

// Forces every block to at least 8-byte alignment, which covers every
// primitive type this crate's other components place into a pool (action
// nodes, thenable payloads, trampoline closures). `spec.md` allows an
// arbitrary power-of-two alignment `A`; this crate fixes `A = 8` rather than
// taking it as a further const-generic parameter (recorded in DESIGN.md).
#[repr(C)]
struct Block<const C: usize> {
    _align: [u64; 0],
    bytes: [u8; C],
}

impl<const C: usize> Block<C> {
    const fn uninit() -> Self {
        Block {
            _align: [],
            bytes: [0; C],
        }
    }
}

#[derive(Clone, Copy)]
enum State<const C: usize, const N: usize> {
    Free(Option<NonNull<Slot<C, N>>>),
    Allocated(NonNull<Pool<C, N>>),
}

#[repr(C)]
struct Slot<const C: usize, const N: usize> {
    meta: Cell<State<C, N>>,
    data: UnsafeCell<Block<C>>,
}

impl<const C: usize, const N: usize> Slot<C, N> {
    const fn uninit() -> Self {
        Slot {
            meta: Cell::new(State::Free(None)),
            data: UnsafeCell::new(Block::uninit()),
        }
    }
}

/// A deterministic, fixed-capacity allocator of `N` blocks of `C` bytes
/// each.
pub struct Pool<const C: usize, const N: usize> {
    tag: usize,
    slots: UnsafeCell<[Slot<C, N>; N]>,
    free: Cell<Option<NonNull<Slot<C, N>>>>,
    allocated: Cell<usize>,
    initialized: Cell<bool>,
}

// SAFETY: every mutation of the shared fields happens inside
// `critical_section::with`.
unsafe impl<const C: usize, const N: usize> Sync for Pool<C, N> {}

impl<const C: usize, const N: usize> Pool<C, N> {
    /// Creates a new, empty pool. All `N` blocks become available the first
    /// time the pool is used.
    pub const fn new() -> Self {
        Pool {
            tag: POOL_MAGIC,
            slots: UnsafeCell::new([const { Slot::uninit() }; N]),
            free: Cell::new(None),
            allocated: Cell::new(0),
            initialized: Cell::new(false),
        }
    }

    fn ensure_initialized(&self) {
        if self.initialized.get() {
            return;
        }
        critical_section::with(|| {
            if self.initialized.get() {
                return;
            }
            let slots = unsafe { &mut *self.slots.get() };
            let mut next = None;
            for slot in slots.iter_mut().rev() {
                slot.meta.set(State::Free(next));
                next = Some(NonNull::from(&*slot));
            }
            self.free.set(next);
            self.initialized.set(true);
        });
    }

    /// Number of blocks currently allocated.
    pub fn allocated(&self) -> usize {
        self.allocated.get()
    }

    /// Total block capacity of this pool (`N`).
    pub fn capacity(&self) -> usize {
        N
    }

    /// Claims a raw, uninitialized block. Returns `None` when exhausted.
    pub fn allocate_raw(&self) -> Option<NonNull<u8>> {
        self.ensure_initialized();
        critical_section::with(|| {
            let head = self.free.get()?;
            let next = match unsafe { head.as_ref().meta.get() } {
                State::Free(next) => next,
                State::Allocated(_) => fail(
                    PanicTag::Memory,
                    "pool free list points at an allocated slot",
                ),
            };
            self.free.set(next);
            unsafe {
                head.as_ref()
                    .meta
                    .set(State::Allocated(NonNull::from(self)));
            }
            self.allocated.set(self.allocated.get() + 1);
            let data = unsafe { head.as_ref().data.get() as *mut u8 };
            Some(unsafe { NonNull::new_unchecked(data) })
        })
    }

    /// Returns a raw block to its owning pool.
    ///
    /// The owner is recovered from the block's metadata, not from `self`;
    /// freeing a block through a different live `Pool` instance than the
    /// one it was allocated from is supported, per `spec.md` §4.C. Panics
    /// with [`PanicTag::Memory`] if the metadata's instance tag does not
    /// match [`POOL_MAGIC`], or if the block is already free.
    pub fn free_raw(p: NonNull<u8>) {
        let offset = mem::offset_of!(Slot<C, N>, data);
        let slot_ptr = unsafe {
            NonNull::new_unchecked(p.as_ptr().sub(offset) as *mut Slot<C, N>)
        };
        let meta = unsafe { slot_ptr.as_ref().meta.get() };
        match meta {
            State::Allocated(owner) => {
                let owner = unsafe { owner.as_ref() };
                if owner.tag != POOL_MAGIC {
                    fail(
                        PanicTag::Memory,
                        "block freed into a pool whose instance tag does not match",
                    );
                }
                critical_section::with(|| {
                    let old_head = owner.free.get();
                    unsafe { slot_ptr.as_ref().meta.set(State::Free(old_head)) };
                    owner.free.set(Some(slot_ptr));
                    owner.allocated.set(owner.allocated.get() - 1);
                });
            }
            State::Free(_) => {
                fail(PanicTag::Memory, "double free of an already-free block");
            }
        }
    }

    /// Placement-constructs a `T` in a fresh block and returns a pointer to
    /// it. Panics on exhaustion; see [`Pool::try_make`] for a non-panicking
    /// variant.
    ///
    /// # Panics
    /// Panics if `size_of::<T>() > C` or `align_of::<T>() > 8`, and via the
    /// installed [`crate::error::Handler`] if the pool is exhausted.
    pub fn make<T>(&self, value: T) -> NonNull<T> {
        match self.try_make(value) {
            Some(p) => p,
            None => fail(PanicTag::Memory, "pool exhausted"),
        }
    }

    /// Like [`Pool::make`], but returns `None` instead of panicking when
    /// the pool is exhausted.
    pub fn try_make<T>(&self, value: T) -> Option<NonNull<T>> {
        assert!(
            mem::size_of::<T>() <= C,
            "pool block size too small for this type"
        );
        assert!(
            mem::align_of::<T>() <= 8,
            "pool blocks are only guaranteed to be 8-byte aligned"
        );
        let raw = self.allocate_raw()?;
        let typed = raw.as_ptr() as *mut T;
        unsafe { typed.write(value) };
        Some(unsafe { NonNull::new_unchecked(typed) })
    }

    /// Destroys the `T` at `p` and returns its block to the free list.
    ///
    /// # Safety
    /// `p` must have been produced by [`Pool::make`] or [`Pool::try_make`]
    /// on a pool with the same `C`/`N`, and not already dropped.
    pub unsafe fn drop<T>(p: NonNull<T>) {
        core::ptr::drop_in_place(p.as_ptr());
        Self::free_raw(p.cast::<u8>());
    }
}

impl<const C: usize, const N: usize> Default for Pool<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn round_trips_allocate_and_free() {
        static POOL: Pool<4, 3> = Pool::new();
        let a = POOL.try_make(1u32).unwrap();
        let b = POOL.try_make(2u32).unwrap();
        assert_eq!(POOL.allocated(), 2);
        unsafe { Pool::<4, 3>::drop(a) };
        assert_eq!(POOL.allocated(), 1);
        let c = POOL.try_make(3u32).unwrap();
        assert_eq!(unsafe { *c.as_ptr() }, 3);
        unsafe {
            Pool::<4, 3>::drop(b);
            Pool::<4, 3>::drop(c);
        }
        assert_eq!(POOL.allocated(), 0);
    }

    #[test]
    fn exhaustion_is_observable_without_panicking_via_try_make() {
        static POOL: Pool<4, 2> = Pool::new();
        let _a = POOL.try_make(1u32).unwrap();
        let _b = POOL.try_make(2u32).unwrap();
        assert!(POOL.try_make(3u32).is_none());
    }

    // S3 in spec.md §8: capacity-3 pool of 4-byte blocks.
    #[test]
    fn s3_pool_exhaustion_scenario() {
        static POOL: Pool<4, 3> = Pool::new();
        let a = POOL.try_make(0u32).unwrap();
        let b = POOL.try_make(0u32).unwrap();
        let c = POOL.try_make(0u32).unwrap();
        assert!(POOL.try_make(0u32).is_none());
        unsafe { Pool::<4, 3>::drop(b) };
        let _e = POOL.try_make(0u32).unwrap();
        assert_eq!(POOL.allocated(), 3);
        unsafe {
            Pool::<4, 3>::drop(a);
            Pool::<4, 3>::drop(c);
            Pool::<4, 3>::drop(_e);
        }
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        static POOL: Pool<4, 2> = Pool::new();
        let a = POOL.try_make(1u32).unwrap();
        unsafe {
            Pool::<4, 2>::drop(a);
            Pool::<4, 2>::drop(a);
        }
    }

    #[test]
    fn destructors_run_on_drop() {
        static COUNT: AtomicUsize = AtomicUsize::new(0);

        struct X;
        impl Drop for X {
            fn drop(&mut self) {
                COUNT.fetch_add(1, Ordering::Relaxed);
            }
        }

        static POOL: Pool<8, 2> = Pool::new();
        let x = POOL.try_make(X).unwrap();
        let y = POOL.try_make(X).unwrap();
        unsafe {
            Pool::<8, 2>::drop(x);
        }
        assert_eq!(COUNT.load(Ordering::Relaxed), 1);
        unsafe {
            Pool::<8, 2>::drop(y);
        }
        assert_eq!(COUNT.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn conservation_holds_across_many_cycles() {
        static POOL: Pool<4, 4> = Pool::new();
        for _ in 0..1000 {
            let mut handles = std::vec::Vec::new();
            for i in 0..4u32 {
                handles.push(POOL.try_make(i).unwrap());
            }
            assert!(POOL.try_make(0u32).is_none());
            assert_eq!(POOL.allocated(), POOL.capacity());
            for h in handles {
                unsafe { Pool::<4, 4>::drop(h) };
            }
            assert_eq!(POOL.allocated(), 0);
        }
    }

    #[test]
    fn freeing_through_a_different_instance_still_resolves_the_true_owner() {
        static POOL_A: Pool<4, 2> = Pool::new();
        static POOL_B: Pool<4, 2> = Pool::new();
        let a = POOL_A.try_make(7u32).unwrap();
        // `free_raw`/`drop` are associated functions, not methods: calling
        // them "through" POOL_B still frees into POOL_A, since the owner is
        // recovered from the block's own metadata.
        let _ = &POOL_B;
        unsafe { Pool::<4, 2>::drop(a) };
        assert_eq!(POOL_A.allocated(), 0);
    }
}

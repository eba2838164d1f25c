//! Allocation-tracking allocator.
//!
//! [`TrackingAllocator`] wraps another [`Allocator`] and records every live
//! allocation by address. It is the oracle the object model's tests use to
//! prove that instances and shared counters are freed exactly once:
//!
//! - deallocating an unknown pointer panics (double free)
//! - deallocating with a different layout panics
//! - [`TrackingAllocator::fail_after`] injects [`AllocError`]s
//!
//! Single-threaded, like the handles that borrow it.

use crate::alloc::{AllocError, Allocator, Heap};
use hashbrown::HashMap;
use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

/// Counters reported by [`TrackingAllocator::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Successful `allocate` calls.
    pub allocations: usize,
    /// `deallocate` calls.
    pub deallocations: usize,
    /// `allocate` calls rejected by fault injection or the inner allocator.
    pub failures: usize,
    /// Allocations not yet returned.
    pub live: usize,
    /// Bytes not yet returned.
    pub live_bytes: usize,
}

/// An [`Allocator`] that records live allocations.
pub struct TrackingAllocator<A: Allocator = Heap> {
    inner: A,
    live: RefCell<HashMap<usize, Layout>>,
    stats: Cell<AllocStats>,
    /// Remaining successful allocations before failures start.
    budget: Cell<Option<usize>>,
}

impl TrackingAllocator<Heap> {
    /// Tracks allocations served by the system allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(Heap)
    }
}

impl Default for TrackingAllocator<Heap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> TrackingAllocator<A> {
    /// Tracks allocations served by `inner`.
    pub fn wrap(inner: A) -> Self {
        TrackingAllocator {
            inner,
            live: RefCell::new(HashMap::new()),
            stats: Cell::new(AllocStats::default()),
            budget: Cell::new(None),
        }
    }

    /// Lets the next `successes` allocations through, then fails every
    /// following one.
    pub fn fail_after(&self, successes: usize) {
        self.budget.set(Some(successes));
    }

    /// Removes any fault injection.
    pub fn clear_failures(&self) {
        self.budget.set(None);
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> AllocStats {
        self.stats.get()
    }

    /// Returns `true` if `ptr` is a live allocation.
    pub fn is_live<T>(&self, ptr: NonNull<T>) -> bool {
        self.live.borrow().contains_key(&ptr.as_ptr().addr())
    }

    /// Panics unless every allocation has been returned.
    ///
    /// # Panics
    ///
    /// Panics with the number of leaked allocations and bytes.
    #[track_caller]
    pub fn assert_no_leaks(&self) {
        let stats = self.stats();
        assert!(
            stats.live == 0,
            "{} allocation(s) leaked ({} bytes)",
            stats.live,
            stats.live_bytes
        );
    }

    fn update(&self, f: impl FnOnce(&mut AllocStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn consume_budget(&self) -> bool {
        match self.budget.get() {
            None => true,
            Some(0) => false,
            Some(n) => {
                self.budget.set(Some(n - 1));
                true
            }
        }
    }
}

impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if !self.consume_budget() {
            self.update(|s| s.failures += 1);
            return Err(AllocError::new(layout));
        }

        let ptr = match self.inner.allocate(layout) {
            Ok(ptr) => ptr,
            Err(err) => {
                self.update(|s| s.failures += 1);
                return Err(err);
            }
        };

        // Zero-sized allocations share dangling addresses; count them but
        // only key real memory by address.
        if layout.size() != 0 {
            self.live.borrow_mut().insert(ptr.as_ptr().addr(), layout);
        }
        self.update(|s| {
            s.allocations += 1;
            s.live += 1;
            s.live_bytes += layout.size();
        });

        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            let recorded = self.live.borrow_mut().remove(&ptr.as_ptr().addr());
            match recorded {
                None => panic!(
                    "deallocate of untracked pointer {:p} (double free?)",
                    ptr.as_ptr()
                ),
                Some(recorded) if recorded != layout => panic!(
                    "deallocate of {:p} with layout {layout:?}, allocated as {recorded:?}",
                    ptr.as_ptr()
                ),
                Some(_) => {}
            }
        }

        self.update(|s| {
            s.deallocations += 1;
            s.live -= 1;
            s.live_bytes -= layout.size();
        });

        // SAFETY: the caller upholds the deallocate contract for `inner`
        unsafe { self.inner.deallocate(ptr, layout) };
    }
}

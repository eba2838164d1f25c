//! The allocator capability.
//!
//! The object model never calls the global allocator directly. Every instance
//! and shared counter is obtained through an [`Allocator`] the caller injects,
//! so a heap, an arena, or an instrumented allocator can sit underneath a
//! handle without the core noticing.
//!
//! # Contract
//!
//! - `allocate` returns memory valid for `layout`, or [`AllocError`]
//! - `deallocate` receives exactly the pointer and layout of a previous
//!   `allocate` on the same allocator, once
//! - zero-sized layouts must succeed and return a well-aligned dangling
//!   pointer
//!
//! # Example
//!
//! ```
//! use oxiface_mem::{Allocator, Heap};
//!
//! let heap = Heap;
//! let allocator: &dyn Allocator = &heap;
//!
//! let ptr = allocator.create(42u64).unwrap();
//! unsafe {
//!     assert_eq!(*ptr.as_ptr(), 42);
//!     allocator.destroy(ptr);
//! }
//! ```

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::{self, NonNull};

/// Allocation failure reported by an [`Allocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    /// The layout that could not be satisfied.
    pub layout: Layout,
}

impl AllocError {
    /// Creates an error for the given layout.
    #[must_use]
    pub const fn new(layout: Layout) -> Self {
        AllocError { layout }
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Allocation of {} bytes (align {}) failed",
            self.layout.size(),
            self.layout.align()
        )
    }
}

impl std::error::Error for AllocError {}

/// An injected memory capability.
///
/// Object handles borrow an allocator and never own it.
pub trait Allocator {
    /// Allocates memory for `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the request cannot be satisfied.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Returns memory obtained from [`Allocator::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this allocator with the same
    /// `layout`, and must not be deallocated twice.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

impl dyn Allocator + '_ {
    /// Allocates storage for a `T` and moves `value` into it.
    ///
    /// On failure `value` is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the allocator cannot provide the memory.
    pub fn create<T>(&self, value: T) -> Result<NonNull<T>, AllocError> {
        let ptr = self.allocate(Layout::new::<T>())?.cast::<T>();
        // SAFETY: ptr is fresh, non-null and valid for a T (allocate contract)
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Drops the `T` at `ptr` and returns its storage.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`create`](Self::create) on this allocator and
    /// must not be used afterwards.
    pub unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: the caller guarantees ptr holds a live T created by us
        unsafe {
            ptr::drop_in_place(ptr.as_ptr());
            self.deallocate(ptr.cast(), Layout::new::<T>());
        }
    }
}

/// Returns a well-aligned dangling pointer for zero-sized layouts.
pub(crate) fn dangling(layout: Layout) -> NonNull<u8> {
    // SAFETY: an alignment is never zero
    unsafe { NonNull::new_unchecked(ptr::without_provenance_mut(layout.align())) }
}

/// The system allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heap;

impl Allocator for Heap {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        // SAFETY: layout has non-zero size (checked above)
        let raw = unsafe { alloc::alloc(layout) };
        NonNull::new(raw).ok_or(AllocError::new(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: the caller guarantees ptr/layout came from allocate
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct DropFlag<'a>(&'a Cell<u32>);

    impl Drop for DropFlag<'_> {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_heap_create_and_destroy() {
        let allocator: &dyn Allocator = &Heap;

        let ptr = allocator.create([1u32, 2, 3]).unwrap();
        unsafe {
            assert_eq!(*ptr.as_ptr(), [1, 2, 3]);
            allocator.destroy(ptr);
        }
    }

    #[test]
    fn test_destroy_runs_drop() {
        let drops = Cell::new(0);
        let allocator: &dyn Allocator = &Heap;

        let ptr = allocator.create(DropFlag(&drops)).unwrap();
        assert_eq!(drops.get(), 0);

        unsafe { allocator.destroy(ptr) };
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_zero_sized_allocation_is_aligned() {
        #[repr(align(64))]
        struct Aligned;

        let allocator: &dyn Allocator = &Heap;
        let ptr = allocator.create(Aligned).unwrap();

        assert_eq!(ptr.as_ptr().addr() % 64, 0);
        unsafe { allocator.destroy(ptr) };
    }

    #[test]
    fn test_alloc_error_display() {
        let err = AllocError::new(Layout::new::<u64>());
        assert_eq!(err.to_string(), "Allocation of 8 bytes (align 8) failed");
    }
}

//! Arena allocators.
//!
//! Two bump-pointer arenas share the same chunk strategy (chunks come from
//! the system allocator, never move, and double in size up to a cap):
//!
//! - [`GlobalArena`]: thread-safe, lives for the whole program. The object
//!   model stores descriptors and cached vtables here so they can be handed
//!   out as `&'static`.
//! - [`BumpArena`]: single-threaded, implements [`Allocator`]. Individual
//!   deallocation is a no-op; every object is reclaimed when the arena drops.
//!   Suitable for handles whose objects share one phase-scoped lifetime.
//!
//! # Examples
//!
//! ```
//! use oxiface_mem::arena::global_arena;
//!
//! let slot: &'static mut u32 = global_arena().alloc(7);
//! assert_eq!(*slot, 7);
//! ```
//!
//! ```
//! use oxiface_mem::{Allocator, BumpArena};
//!
//! let arena = BumpArena::new(8192);
//! let allocator: &dyn Allocator = &arena;
//!
//! let value = allocator.create(3.5f64).unwrap();
//! unsafe { assert_eq!(*value.as_ptr(), 3.5) };
//! ```

use crate::alloc::{AllocError, Allocator, dangling};
use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

/// Alignment of every chunk and the minimum alignment of arena values.
const CHUNK_ALIGNMENT: usize = 16;

/// Smallest chunk either arena will request.
const MIN_CHUNK_SIZE: usize = 4096;

/// Largest chunk produced by doubling (oversized requests get their own).
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Allocation statistics for an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Bytes handed out, including alignment padding of each request.
    pub total_allocated: usize,
    /// Number of chunks owned by the arena.
    pub chunk_count: usize,
    /// Sum of chunk capacities in bytes.
    pub total_capacity: usize,
}

/// Rounds `addr` up to `align` (a power of two).
#[inline]
const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

/// Picks the next chunk size for a request of `size` bytes at `align`.
fn next_chunk_size(previous: usize, size: usize, align: usize) -> usize {
    let grown = (previous * 2).min(MAX_CHUNK_SIZE);
    grown.max(size + align).max(MIN_CHUNK_SIZE)
}

/// Backing memory shared by both arena flavors.
struct ChunkMemory {
    start: NonNull<u8>,
    capacity: usize,
}

impl ChunkMemory {
    fn new(capacity: usize) -> Result<Self, AllocError> {
        let layout = Layout::from_size_align(capacity, CHUNK_ALIGNMENT)
            .map_err(|_| AllocError::new(Layout::new::<u8>()))?;

        // SAFETY: capacity >= MIN_CHUNK_SIZE, so the layout is non-zero
        let raw = unsafe { alloc::alloc(layout) };
        let start = NonNull::new(raw).ok_or(AllocError::new(layout))?;

        Ok(ChunkMemory { start, capacity })
    }

    fn end_addr(&self) -> usize {
        self.start.as_ptr().addr() + self.capacity
    }
}

impl Drop for ChunkMemory {
    fn drop(&mut self) {
        // SAFETY: same layout as in `new`, which already validated it
        unsafe {
            let layout =
                Layout::from_size_align_unchecked(self.capacity, CHUNK_ALIGNMENT);
            alloc::dealloc(self.start.as_ptr(), layout);
        }
    }
}

/// Chunk with an atomic bump pointer.
struct SharedChunk {
    memory: ChunkMemory,
    cursor: AtomicPtr<u8>,
}

impl SharedChunk {
    fn new(capacity: usize) -> Result<Self, AllocError> {
        let memory = ChunkMemory::new(capacity)?;
        let cursor = AtomicPtr::new(memory.start.as_ptr());
        Ok(SharedChunk { memory, cursor })
    }

    /// Bumps the cursor with a CAS loop; `None` if the chunk is exhausted.
    fn try_alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        loop {
            let current = self.cursor.load(Ordering::Acquire);
            let start = align_up(current.addr(), align);
            let end = start.checked_add(size)?;
            if end > self.memory.end_addr() {
                return None;
            }

            // with_addr keeps the chunk's provenance
            let next = current.with_addr(end);
            if self
                .cursor
                .compare_exchange_weak(
                    current,
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return NonNull::new(current.with_addr(start));
            }
        }
    }
}

/// Thread-safe arena for values that live until the program exits.
///
/// Values written here are never dropped. The arena is used through
/// [`global_arena`] for runtime metadata such as cached vtables.
pub struct GlobalArena {
    chunks: Mutex<Vec<NonNull<SharedChunk>>>,
    current: AtomicPtr<SharedChunk>,
    total_allocated: AtomicUsize,
}

// SAFETY: all mutation goes through atomics or the chunk-list mutex, and
// chunk memory is never freed while the arena is alive.
unsafe impl Send for GlobalArena {}
unsafe impl Sync for GlobalArena {}

impl GlobalArena {
    /// Creates an arena whose first chunk holds `chunk_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if the first chunk cannot be allocated.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        let size = chunk_size.max(MIN_CHUNK_SIZE).next_power_of_two();
        let first = leak_chunk(
            SharedChunk::new(size).expect("Failed to allocate initial chunk"),
        );

        GlobalArena {
            chunks: Mutex::new(vec![first]),
            current: AtomicPtr::new(first.as_ptr()),
            total_allocated: AtomicUsize::new(0),
        }
    }

    /// Moves `value` into the arena and returns a reference that lives as
    /// long as the arena.
    ///
    /// `value` is never dropped.
    ///
    /// # Panics
    ///
    /// Panics if a new chunk is needed and the system allocator fails.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc<T>(&self, value: T) -> &mut T {
        let size = std::mem::size_of::<T>();
        let align = std::mem::align_of::<T>().max(CHUNK_ALIGNMENT);

        loop {
            let current = self.current.load(Ordering::Acquire);
            // SAFETY: `current` always points at a boxed chunk owned by
            // `self.chunks`, which only ever grows
            let chunk = unsafe { &*current };

            if let Some(ptr) = chunk.try_alloc(size, align) {
                self.total_allocated.fetch_add(size, Ordering::Relaxed);
                let slot = ptr.as_ptr().cast::<T>();
                // SAFETY: slot is aligned for T, in bounds, and exclusively ours
                unsafe {
                    slot.write(value);
                    return &mut *slot;
                }
            }

            self.grow(current, size, align);
        }
    }

    /// Installs a fresh chunk unless another thread already did.
    #[cold]
    fn grow(&self, exhausted: *mut SharedChunk, size: usize, align: usize) {
        let mut chunks = self.chunks.lock().unwrap();
        if self.current.load(Ordering::Acquire) != exhausted {
            return;
        }

        // SAFETY: chunk pointers stay valid until the arena drops
        let previous = chunks
            .last()
            .map_or(MIN_CHUNK_SIZE, |c| unsafe { c.as_ref() }.memory.capacity);
        let chunk = leak_chunk(
            SharedChunk::new(next_chunk_size(previous, size, align))
                .expect("Failed to allocate arena chunk"),
        );
        chunks.push(chunk);
        self.current.store(chunk.as_ptr(), Ordering::Release);
    }

    /// Returns allocation statistics.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let chunks = self.chunks.lock().unwrap();
        ArenaStats {
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
            chunk_count: chunks.len(),
            // SAFETY: chunk pointers stay valid until the arena drops
            total_capacity: chunks
                .iter()
                .map(|c| unsafe { c.as_ref() }.memory.capacity)
                .sum(),
        }
    }
}

impl Drop for GlobalArena {
    fn drop(&mut self) {
        let chunks = self.chunks.get_mut().unwrap();
        for chunk in chunks.drain(..) {
            // SAFETY: every chunk came from `leak_chunk` and is dropped once
            drop(unsafe { Box::from_raw(chunk.as_ptr()) });
        }
    }
}

/// Moves a chunk to a stable heap address owned by raw pointer.
fn leak_chunk(chunk: SharedChunk) -> NonNull<SharedChunk> {
    NonNull::from(Box::leak(Box::new(chunk)))
}

/// Process-wide arena for runtime metadata.
#[must_use]
pub fn global_arena() -> &'static GlobalArena {
    static ARENA: OnceLock<GlobalArena> = OnceLock::new();
    ARENA.get_or_init(|| GlobalArena::new(64 * 1024))
}

/// Chunk with a plain bump pointer.
struct LocalChunk {
    memory: ChunkMemory,
    cursor: Cell<usize>,
}

impl LocalChunk {
    fn new(capacity: usize) -> Result<Self, AllocError> {
        let memory = ChunkMemory::new(capacity)?;
        let cursor = Cell::new(memory.start.as_ptr().addr());
        Ok(LocalChunk { memory, cursor })
    }

    fn try_alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let start = align_up(self.cursor.get(), align);
        let end = start.checked_add(size)?;
        if end > self.memory.end_addr() {
            return None;
        }

        self.cursor.set(end);
        NonNull::new(self.memory.start.as_ptr().with_addr(start))
    }
}

/// Single-threaded bump arena usable as an [`Allocator`].
///
/// `deallocate` is a no-op; memory is returned to the system when the arena
/// is dropped. Handles borrowing the arena cannot outlive it.
pub struct BumpArena {
    chunks: RefCell<Vec<LocalChunk>>,
    total_allocated: Cell<usize>,
}

impl BumpArena {
    /// Creates an arena whose first chunk holds `chunk_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if the first chunk cannot be allocated.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        let size = chunk_size.max(MIN_CHUNK_SIZE).next_power_of_two();
        let first = LocalChunk::new(size).expect("Failed to allocate initial chunk");

        BumpArena {
            chunks: RefCell::new(vec![first]),
            total_allocated: Cell::new(0),
        }
    }

    /// Returns allocation statistics.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let chunks = self.chunks.borrow();
        ArenaStats {
            total_allocated: self.total_allocated.get(),
            chunk_count: chunks.len(),
            total_capacity: chunks.iter().map(|c| c.memory.capacity).sum(),
        }
    }
}

impl Allocator for BumpArena {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        let (size, align) = (layout.size(), layout.align());
        let mut chunks = self.chunks.borrow_mut();

        if let Some(ptr) = chunks.last().and_then(|c| c.try_alloc(size, align)) {
            self.total_allocated.set(self.total_allocated.get() + size);
            return Ok(ptr);
        }

        let previous = chunks.last().map_or(MIN_CHUNK_SIZE, |c| c.memory.capacity);
        let chunk = LocalChunk::new(next_chunk_size(previous, size, align))?;
        let ptr = chunk.try_alloc(size, align).ok_or(AllocError::new(layout))?;
        chunks.push(chunk);

        self.total_allocated.set(self.total_allocated.get() + size);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

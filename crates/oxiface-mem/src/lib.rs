//! `OxIface` memory management.
//!
//! This crate provides the allocator capability consumed by the object model
//! core, plus the arenas the core and its callers allocate from:
//!
//! - [`Allocator`]: the injected `allocate` / `deallocate` capability, with
//!   typed `create` / `destroy` helpers on `dyn Allocator`
//! - [`Heap`]: the system allocator
//! - **Arenas** (`arena` feature): [`GlobalArena`] for process-lifetime
//!   metadata and [`BumpArena`] as a scoped allocator
//! - **Tracking** (`tracking` feature): [`TrackingAllocator`] for leak and
//!   double-free detection in tests

pub mod alloc;
#[cfg(feature = "arena")]
pub mod arena;
#[cfg(feature = "tracking")]
pub mod tracking;

pub use alloc::{AllocError, Allocator, Heap};
#[cfg(feature = "arena")]
pub use arena::{ArenaStats, BumpArena, GlobalArena, global_arena};
#[cfg(feature = "tracking")]
pub use tracking::{AllocStats, TrackingAllocator};

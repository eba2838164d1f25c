//! `OxIface`: a hand-built object model for Rust
//!
//! `OxIface` provides single-inheritance class hierarchies with
//! interface-style virtual dispatch and optional shared ownership, built
//! from plain structs instead of trait objects:
//!
//! - **Interfaces** are named sets of pure method signatures
//! - **Classes** embed their base by value in a `base` field
//! - **VTables** are synthesized per concrete type, checked for
//!   completeness and signature agreement, then cached for the process
//! - **Thunks** reach inherited implementations by walking embedded
//!   `base` offsets
//! - **Handles** pair an erased object pointer with its vtable, an
//!   injected allocator and an optional shared reference count
//!
//! # Architecture
//!
//! ```text
//! signature ─► interface ─► chain ─► thunk ─► vtable ─► handle
//!  (analyze)   (layout)    (walk)   (hops)   (build)   (dispatch)
//! ```
//!
//! Everything left of `handle` runs once per type when the vtable is first
//! needed. Structural problems are reported there as [`Error`]s, before any
//! instance is allocated.
//!
//! # Example
//!
//! ```rust
//! use oxiface::{Handle, Heap, class, interface};
//!
//! interface! {
//!     pub interface Shape {
//!         fn area(&self) -> f64;
//!         fn name(&self) -> &'static str;
//!     }
//! }
//!
//! class! {
//!     pub struct Circle: Shape {
//!         pub radius: f64,
//!     }
//!     impl {
//!         fn area(&self) -> f64 {
//!             std::f64::consts::PI * self.radius * self.radius
//!         }
//!
//!         fn name(&self) -> &'static str {
//!             "circle"
//!         }
//!     }
//! }
//!
//! class! {
//!     pub struct NamedCircle: Circle {}
//!     impl {
//!         fn name(&self) -> &'static str {
//!             "named circle"
//!         }
//!     }
//! }
//!
//! let heap = Heap;
//! let shape = Handle::new(
//!     NamedCircle { base: Circle { base: Shape, radius: 2.0 } },
//!     &heap,
//! )
//! .unwrap();
//!
//! let area: f64 = shape.virtual_call("area", ()).unwrap();
//! let name: &str = shape.virtual_call("name", ()).unwrap();
//! assert!((area - 12.566).abs() < 1e-3);
//! assert_eq!(name, "named circle");
//! ```
//!
//! # Logging
//!
//! Descriptor and vtable builds log through `oxiface-log` at `debug`, slot
//! fills and dispatch at `trace`. Set `OXIFACE_LOG=debug` and call
//! [`oxiface_log::init_from_env`] to see them.

#[macro_use]
mod macros;

pub mod chain;
pub mod class;
pub mod error;
pub mod handle;
pub mod interface;
pub mod signature;
pub mod thunk;
pub mod vtable;

// Re-export commonly used types
pub use chain::Chain;
pub use class::{Base, Class, ClassBuilder, ClassType, Imp, Link, MethodImpl};
pub use error::{Error, Result};
pub use handle::Handle;
pub use interface::{Interface, InterfaceBuilder, InterfaceType, Requirement, VTableLayout};
pub use signature::{ArgPack, Constness, Declaration, Param, ParamKind, Signature, TypeDesc, analyze};
pub use thunk::Thunk;
pub use vtable::{VTable, VTableBuilder, validate};

pub use oxiface_mem::{AllocError, Allocator, BumpArena, Heap, TrackingAllocator};

//! VTable construction and caching.
//!
//! [`VTableBuilder`] fills the slot layout of the root interface by walking a
//! class's [`Chain`] from the root-most class toward the most derived one.
//! Every level that implements an interface method overwrites that slot, so
//! the most derived override wins. [`VTableBuilder::finish`] refuses to
//! produce a [`VTable`] while any slot is unset.
//!
//! # Caching
//!
//! [`VTable::of`] builds each concrete type's table once. Finished tables are
//! allocated in the global arena and live for the rest of the process:
//!
//! ```text
//! TypeId ──► &'static VTable ──► slots: [Thunk; n] + drop glue + Layout
//! ```
//!
//! Build errors are never cached; a failing type reports the same error on
//! every attempt.
//!
//! # Thread Safety
//!
//! Tables are immutable once built. The cache is a `RwLock` so concurrent
//! first uses may build the same table twice; only one is published.

use crate::chain::Chain;
use crate::class::{Class, ClassType, DropFn};
use crate::error::{Error, Result};
use crate::interface::{Interface, VTableLayout};
use crate::thunk::{self, Thunk};
use fxhash::FxHashMap;
use oxiface_log::{debug, trace, warn};
use oxiface_mem::global_arena;
use std::alloc::Layout;
use std::any::TypeId;
use std::sync::{OnceLock, RwLock};

/// Global table cache, keyed by concrete type.
static VTABLES: OnceLock<RwLock<FxHashMap<TypeId, &'static VTable>>> = OnceLock::new();

fn cache() -> &'static RwLock<FxHashMap<TypeId, &'static VTable>> {
    VTABLES.get_or_init(|| RwLock::new(FxHashMap::default()))
}

/// Incrementally filled vtable.
#[derive(Debug)]
pub struct VTableBuilder {
    class: &'static Class,
    chain: Chain,
    layout: VTableLayout,
    slots: Box<[Option<Thunk>]>,
}

impl VTableBuilder {
    /// Resolves `class`'s chain and starts with every slot unset.
    #[must_use]
    pub fn new(class: &'static Class) -> Self {
        let chain = Chain::resolve(class);
        let layout = VTableLayout::synthesize(chain.root());
        let slots = layout.instantiate();

        VTableBuilder {
            class,
            chain,
            layout,
            slots,
        }
    }

    #[must_use]
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Returns the thunk currently in slot `name`.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&Thunk> {
        self.layout
            .position(name)
            .and_then(|index| self.slots[index].as_ref())
    }

    /// Fills slots from every chain level, root-most first.
    ///
    /// Methods a class declares that are not part of the interface are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VTableTypeMismatch`] if an implementation's erased
    /// signature differs from its slot.
    pub fn fill(&mut self) -> Result<()> {
        for index in (0..self.chain.len()).rev() {
            let class = self.chain.classes()[index];

            for method in class.methods() {
                let Some(slot) = self.layout.position(method.name()) else {
                    continue;
                };

                let thunk = thunk::generate(&self.chain, index, method.name());
                let expected = &self.layout.slots()[slot].signature;
                if thunk.signature() != expected {
                    return Err(Error::VTableTypeMismatch {
                        interface: self.layout.interface(),
                        method: method.name(),
                        expected: expected.to_string(),
                        actual: thunk.signature().to_string(),
                        chain: self.chain.to_string(),
                    });
                }

                trace!(
                    "{}: slot {} <- {} (hops {:?})",
                    self.class.name(),
                    method.name(),
                    thunk.owner(),
                    thunk.hops()
                );
                self.slots[slot] = Some(thunk);
            }
        }

        Ok(())
    }

    /// Freezes the table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PureVirtualUnimplemented`] naming the first unset
    /// slot.
    pub fn finish(self) -> Result<VTable> {
        let interface = self.chain.root();
        let mut slots = Vec::with_capacity(self.slots.len());

        for (slot, layout) in self.slots.into_vec().into_iter().zip(self.layout.slots()) {
            let thunk = slot.ok_or(Error::PureVirtualUnimplemented {
                interface: interface.name(),
                method: layout.name,
            })?;
            slots.push(thunk);
        }

        let index = slots
            .iter()
            .enumerate()
            .map(|(i, thunk)| (thunk.method(), i))
            .collect();

        Ok(VTable {
            interface,
            class: self.class,
            chain: self.chain,
            slots: slots.into_boxed_slice(),
            index,
            drop: self.class.drop_fn(),
            layout: self.class.layout(),
        })
    }

    /// Runs [`fill`](Self::fill) and [`finish`](Self::finish).
    ///
    /// # Errors
    ///
    /// See [`fill`](Self::fill) and [`finish`](Self::finish).
    pub fn build(class: &'static Class) -> Result<VTable> {
        let mut builder = VTableBuilder::new(class);
        builder.fill()?;
        builder.finish()
    }
}

/// A complete vtable: one thunk per interface method plus the concrete
/// type's destructor.
#[derive(Debug)]
pub struct VTable {
    interface: &'static Interface,
    class: &'static Class,
    chain: Chain,
    slots: Box<[Thunk]>,
    index: FxHashMap<&'static str, usize>,
    drop: DropFn,
    layout: Layout,
}

impl VTable {
    /// Returns the cached table of `T`, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns any error from building `T`'s descriptors or table.
    pub fn of<T: ClassType>() -> Result<&'static VTable> {
        let key = TypeId::of::<T>();

        if let Some(&vtable) = cache().read().unwrap().get(&key) {
            return Ok(vtable);
        }

        let vtable = T::descriptor().and_then(VTableBuilder::build).inspect_err(|err| {
            warn!("rejected vtable for {}: {err}", std::any::type_name::<T>());
        })?;

        let mut tables = cache().write().unwrap();
        if let Some(&existing) = tables.get(&key) {
            return Ok(existing);
        }

        debug!(
            "built vtable {} for {} ({} slots, chain {})",
            vtable.interface.name(),
            vtable.class.name(),
            vtable.slots.len(),
            vtable.chain
        );

        let vtable: &'static VTable = global_arena().alloc(vtable);
        tables.insert(key, vtable);
        Ok(vtable)
    }

    #[must_use]
    pub fn interface(&self) -> &'static Interface {
        self.interface
    }

    /// Returns the concrete class the table was built for.
    #[must_use]
    pub fn class(&self) -> &'static Class {
        self.class
    }

    #[must_use]
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Returns the thunks in interface declaration order.
    #[must_use]
    pub fn slots(&self) -> &[Thunk] {
        &self.slots
    }

    /// Returns the slot names in interface declaration order.
    pub fn slot_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots.iter().map(Thunk::method)
    }

    /// Looks up a slot by method name.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&Thunk> {
        self.index.get(name).map(|&i| &self.slots[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the concrete type's erased drop glue.
    #[must_use]
    pub fn drop_fn(&self) -> DropFn {
        self.drop
    }

    /// Returns the concrete type's allocation layout.
    #[must_use]
    pub fn object_layout(&self) -> Layout {
        self.layout
    }
}

/// Runs every build-time check for `T` without allocating an instance.
///
/// # Errors
///
/// Returns the first structural error of `T`'s hierarchy.
pub fn validate<T: ClassType>() -> Result<()> {
    VTable::of::<T>().map(|_| ())
}

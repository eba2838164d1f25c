//! Class descriptors.
//!
//! A class is a concrete struct that embeds its base in a field named
//! `base`. The base is either another class or, for the root
//! implementation, the zero-sized marker of the interface. Each [`Class`]
//! descriptor records:
//!
//! - the base link and the byte offset of the `base` field
//! - the struct's own field names (for override conflict checks)
//! - the methods the class implements, each as an erased [`Imp`]
//! - the erased drop glue and allocation layout of the struct
//!
//! Descriptors are built once per type by [`ClassType::descriptor`], which the
//! [`class!`](crate::class) macro implements. A class descriptor can only be
//! built after its base descriptor exists, so base links never form a cycle.

use crate::error::{Error, Result};
use crate::interface::{Interface, InterfaceType};
use crate::signature::{self, Constness, Declaration, Signature};
use oxiface_log::debug;
use std::alloc::Layout;
use std::any::{self, TypeId};
use std::fmt;
use std::ptr;

/// Erased implementation of a `&self` method.
///
/// Called with the receiver, a pointer to the packed argument tuple (moved
/// out by the callee), and a pointer to uninitialized storage for the
/// return value.
pub type ConstFn = unsafe fn(this: *const (), args: *mut u8, ret: *mut u8);

/// Erased implementation of a `&mut self` method.
pub type MutFn = unsafe fn(this: *mut (), args: *mut u8, ret: *mut u8);

/// Erased drop glue.
pub type DropFn = unsafe fn(this: *mut ());

/// Method implementation pointer.
#[derive(Debug, Clone, Copy)]
pub enum Imp {
    Const(ConstFn),
    Mut(MutFn),
}

impl Imp {
    /// Returns the receiver constness this implementation expects.
    #[must_use]
    pub fn constness(self) -> Constness {
        match self {
            Imp::Const(_) => Constness::Const,
            Imp::Mut(_) => Constness::Mut,
        }
    }
}

/// A class's base: the root interface or another class.
#[derive(Debug, Clone, Copy)]
pub enum Link {
    Interface(&'static Interface),
    Class(&'static Class),
}

impl Link {
    /// Returns the root interface reached through this link.
    #[must_use]
    pub fn interface(self) -> &'static Interface {
        match self {
            Link::Interface(interface) => interface,
            Link::Class(class) => class.interface,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Link::Interface(interface) => interface.name(),
            Link::Class(class) => class.name,
        }
    }

    /// Returns the class if this link is not the root interface.
    #[must_use]
    pub fn class(self) -> Option<&'static Class> {
        match self {
            Link::Class(class) => Some(class),
            Link::Interface(_) => None,
        }
    }
}

/// A method a class implements.
#[derive(Debug, Clone)]
pub struct MethodImpl {
    name: &'static str,
    signature: Signature,
    imp: Imp,
}

impl MethodImpl {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    #[must_use]
    pub fn imp(&self) -> Imp {
        self.imp
    }
}

/// A class descriptor.
#[derive(Debug)]
pub struct Class {
    name: &'static str,
    type_id: TypeId,
    type_name: &'static str,
    interface: &'static Interface,
    base: Link,
    base_offset: usize,
    fields: Vec<&'static str>,
    methods: Vec<MethodImpl>,
    drop: DropFn,
    layout: Layout,
}

impl Class {
    /// Starts building the descriptor of `T`.
    ///
    /// # Arguments
    ///
    /// * `name` - Class name used in diagnostics
    /// * `base` - Link to the type embedded in `T`'s `base` field
    /// * `base_offset` - Byte offset of that field (`offset_of!(T, base)`)
    #[must_use]
    pub fn builder<T: 'static>(name: &'static str, base: Link, base_offset: usize) -> ClassBuilder {
        ClassBuilder {
            name,
            type_id: TypeId::of::<T>(),
            type_name: any::type_name::<T>(),
            base,
            base_offset,
            fields: Vec::new(),
            methods: Vec::new(),
            drop: drop_erased::<T>,
            layout: Layout::new::<T>(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the Rust type name of the struct.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the root interface of the hierarchy.
    #[must_use]
    pub fn interface(&self) -> &'static Interface {
        self.interface
    }

    #[must_use]
    pub fn base(&self) -> Link {
        self.base
    }

    /// Returns the byte offset of the embedded `base` field.
    #[must_use]
    pub fn base_offset(&self) -> usize {
        self.base_offset
    }

    /// Returns the fields this class declares itself.
    #[must_use]
    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    #[must_use]
    pub fn methods(&self) -> &[MethodImpl] {
        &self.methods
    }

    /// Returns this class's own implementation of `method`, if any.
    #[must_use]
    pub fn declares(&self, method: &str) -> Option<&MethodImpl> {
        self.methods.iter().find(|m| m.name == method)
    }

    /// Returns the drop glue of the struct.
    #[must_use]
    pub fn drop_fn(&self) -> DropFn {
        self.drop
    }

    /// Returns the allocation layout of the struct.
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns the ancestor classes, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &'static Class> {
        let mut next = self.base.class();
        std::iter::from_fn(move || {
            let current = next?;
            next = current.base.class();
            Some(current)
        })
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {}: {}", self.name, self.base.name())
    }
}

/// Builder for [`Class`].
#[derive(Debug)]
pub struct ClassBuilder {
    name: &'static str,
    type_id: TypeId,
    type_name: &'static str,
    base: Link,
    base_offset: usize,
    fields: Vec<&'static str>,
    methods: Vec<(Declaration, Option<Imp>)>,
    drop: DropFn,
    layout: Layout,
}

impl ClassBuilder {
    /// Declares one field. The base-embedding field is implicit.
    #[must_use]
    pub fn field(mut self, name: &'static str) -> Self {
        self.fields.push(name);
        self
    }

    #[must_use]
    pub fn fields(mut self, names: &[&'static str]) -> Self {
        self.fields.extend_from_slice(names);
        self
    }

    /// Declares a method with its erased implementation.
    ///
    /// Only methods named by the interface are recorded; inherent helpers
    /// and constructors are skipped by [`build`](Self::build). `imp` is
    /// `None` for methods that cannot be called through a vtable (no
    /// `&self` / `&mut self` receiver), which is an
    /// [`Error::InvalidReceiver`] for an interface method.
    ///
    /// # Contract
    ///
    /// `imp` must read an argument tuple of the declaration's tuple type and
    /// write a value of its return type. [`class!`](crate::class) generates
    /// conforming implementations; hand-written ones are vouched for by the
    /// `unsafe impl ClassType` that returns the descriptor.
    #[must_use]
    pub fn method(mut self, decl: Declaration, imp: Option<Imp>) -> Self {
        self.methods.push((decl, imp));
        self
    }

    /// Validates the declarations and freezes the descriptor.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateMethod`] if an interface method repeats
    /// - [`Error::InvalidReceiver`] if an interface method has no pointer
    ///   receiver, or its implementation disagrees with the declared receiver
    /// - [`Error::FieldOverrideConflict`] if a field repeats an ancestor's
    pub fn build(self) -> Result<Class> {
        let interface = self.base.interface();
        let mut methods: Vec<MethodImpl> = Vec::with_capacity(self.methods.len());

        for (decl, imp) in &self.methods {
            if interface.method(decl.name()).is_none() {
                continue;
            }
            if methods.iter().any(|m| m.name == decl.name()) {
                return Err(Error::DuplicateMethod {
                    owner: self.name,
                    method: decl.name(),
                });
            }

            let signature = signature::analyze(decl, interface.name(), self.name)?;
            let imp = (*imp)
                .filter(|imp| imp.constness() == signature.receiver())
                .ok_or(Error::InvalidReceiver {
                    interface: interface.name(),
                    owner: self.name,
                    method: decl.name(),
                })?;

            methods.push(MethodImpl {
                name: decl.name(),
                signature,
                imp,
            });
        }

        for &field in self.fields.iter().filter(|&&f| f != "base") {
            let mut link = self.base;
            while let Link::Class(ancestor) = link {
                if ancestor.fields.contains(&field) {
                    return Err(Error::FieldOverrideConflict {
                        interface: interface.name(),
                        class: self.name,
                        field,
                        ancestor: ancestor.name,
                    });
                }
                link = ancestor.base;
            }
        }

        debug!(
            "built class {} (base {}, {} fields, {} methods)",
            self.name,
            self.base.name(),
            self.fields.len(),
            methods.len()
        );

        Ok(Class {
            name: self.name,
            type_id: self.type_id,
            type_name: self.type_name,
            interface,
            base: self.base,
            base_offset: self.base_offset,
            fields: self.fields,
            methods,
            drop: self.drop,
            layout: self.layout,
        })
    }
}

unsafe fn drop_erased<T>(this: *mut ()) {
    // SAFETY: the vtable pairs this glue with objects of type T only
    unsafe { ptr::drop_in_place(this.cast::<T>()) }
}

/// A type that can be embedded as a class's `base`.
///
/// Implemented by interface markers (linking to the interface) and by every
/// class (linking to its own descriptor).
pub trait Base: 'static {
    /// The root interface of the hierarchy.
    type Interface: InterfaceType;

    /// Returns the link a derived class records as its base.
    ///
    /// # Errors
    ///
    /// Returns the error the descriptor failed to build with.
    fn link() -> Result<Link>;
}

/// A concrete class.
///
/// # Safety
///
/// Implementors guarantee that `descriptor()` describes `Self`: its base
/// offset is the offset of a field of type `Self::Parent`, and every method
/// implementation reinterprets its receiver as `Self`. Use
/// [`class!`](crate::class) rather than implementing this by hand.
pub unsafe trait ClassType: Base + Sized {
    /// The embedded base type.
    type Parent: Base<Interface = Self::Interface>;

    /// Returns the process-wide descriptor.
    ///
    /// # Errors
    ///
    /// Returns the error the descriptor failed to build with.
    fn descriptor() -> Result<&'static Class>;

    /// Returns the embedded base.
    fn upcast(&self) -> &Self::Parent;

    /// Returns the embedded base mutably.
    fn upcast_mut(&mut self) -> &mut Self::Parent;
}

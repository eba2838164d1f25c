//! Interface descriptors and vtable layouts.
//!
//! An [`Interface`] is a named, immutable set of pure method signatures plus
//! a `counting` flag selecting the reference-counted variant. Descriptors
//! are usually produced by the [`interface!`](crate::interface) macro and
//! cached for the process lifetime through [`InterfaceType::descriptor`].
//!
//! [`VTableLayout::synthesize`] turns a descriptor into the slot layout that
//! every vtable of that interface is built against.

use crate::error::{Error, Result};
use crate::signature::{self, Declaration, Signature};
use crate::thunk::Thunk;
use oxiface_log::debug;
use std::fmt;

/// A pure method of an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    name: &'static str,
    signature: Signature,
}

impl Requirement {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// An interface descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    name: &'static str,
    methods: Vec<Requirement>,
    counting: bool,
}

impl Interface {
    /// Starts building an interface named `name`.
    ///
    /// # Example
    ///
    /// ```
    /// use oxiface::{Declaration, Interface, ParamKind};
    ///
    /// struct Shape;
    ///
    /// let shape = Interface::builder("Shape")
    ///     .pure(Declaration::new::<(), f64>("area").receiver::<Shape>(ParamKind::Ref))
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(shape.methods().len(), 1);
    /// assert!(!shape.is_counting());
    /// ```
    #[must_use]
    pub fn builder(name: &'static str) -> InterfaceBuilder {
        InterfaceBuilder {
            name,
            counting: false,
            decls: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Methods in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[Requirement] {
        &self.methods
    }

    /// Returns `true` for the reference-counted variant.
    #[must_use]
    pub fn is_counting(&self) -> bool {
        self.counting
    }

    /// Looks up a method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&Requirement> {
        self.methods.iter().find(|m| m.name == name)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.counting {
            write!(f, "counting ")?;
        }
        write!(f, "interface {} {{", self.name)?;
        for method in &self.methods {
            write!(f, " {}: {};", method.name, method.signature)?;
        }
        write!(f, " }}")
    }
}

/// Builder for [`Interface`].
#[derive(Debug)]
pub struct InterfaceBuilder {
    name: &'static str,
    counting: bool,
    decls: Vec<Declaration>,
}

impl InterfaceBuilder {
    /// Selects the reference-counted variant.
    #[must_use]
    pub fn counting(mut self, counting: bool) -> Self {
        self.counting = counting;
        self
    }

    /// Adds a pure method.
    #[must_use]
    pub fn pure(mut self, decl: Declaration) -> Self {
        self.decls.push(decl);
        self
    }

    /// Analyzes every declaration and freezes the interface.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidReceiver`] if a method has no `&self` / `&mut self`
    /// - [`Error::DuplicateMethod`] if a name is declared twice
    pub fn build(self) -> Result<Interface> {
        let mut methods: Vec<Requirement> = Vec::with_capacity(self.decls.len());

        for decl in &self.decls {
            if methods.iter().any(|m| m.name == decl.name()) {
                return Err(Error::DuplicateMethod {
                    owner: self.name,
                    method: decl.name(),
                });
            }

            let signature = signature::analyze(decl, self.name, self.name)?;
            methods.push(Requirement {
                name: decl.name(),
                signature,
            });
        }

        debug!(
            "built interface {} ({} methods, counting: {})",
            self.name,
            methods.len(),
            self.counting
        );

        Ok(Interface {
            name: self.name,
            methods,
            counting: self.counting,
        })
    }
}

/// A type standing for an interface.
///
/// Implemented by the zero-sized markers [`interface!`](crate::interface)
/// declares.
pub trait InterfaceType: 'static {
    /// Returns the process-wide descriptor.
    ///
    /// # Errors
    ///
    /// Returns the error the descriptor failed to build with.
    fn descriptor() -> Result<&'static Interface>;
}

/// One method slot of a [`VTableLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    pub name: &'static str,
    pub signature: Signature,
}

/// Slot layout of an interface's vtables.
///
/// One slot per method in declaration order. The destructor slot is
/// implicit: every vtable also carries the concrete type's erased drop glue
/// and allocation layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VTableLayout {
    interface: &'static str,
    slots: Vec<SlotLayout>,
}

impl VTableLayout {
    /// Derives the layout of `interface`.
    #[must_use]
    pub fn synthesize(interface: &Interface) -> Self {
        VTableLayout {
            interface: interface.name,
            slots: interface
                .methods
                .iter()
                .map(|m| SlotLayout {
                    name: m.name,
                    signature: m.signature.clone(),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    #[must_use]
    pub fn slots(&self) -> &[SlotLayout] {
        &self.slots
    }

    /// Returns the slot index of `name`.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    /// Returns one unset slot per method.
    #[must_use]
    pub fn instantiate(&self) -> Box<[Option<Thunk>]> {
        self.slots.iter().map(|_| None).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::ParamKind;

    struct Shape;

    fn shape() -> InterfaceBuilder {
        Interface::builder("Shape")
            .pure(Declaration::new::<(), f64>("area").receiver::<Shape>(ParamKind::Ref))
            .pure(Declaration::new::<(), &'static str>("name").receiver::<Shape>(ParamKind::Ref))
            .pure(
                Declaration::new::<(f64,), ()>("scale")
                    .receiver::<Shape>(ParamKind::RefMut)
                    .param::<f64>("factor"),
            )
    }

    #[test]
    fn test_build_interface() {
        let shape = shape().build().unwrap();

        assert_eq!(shape.name(), "Shape");
        assert_eq!(shape.methods().len(), 3);
        assert_eq!(shape.methods()[2].name(), "scale");
        assert!(shape.method("area").is_some());
        assert!(shape.method("perimeter").is_none());
        assert!(!shape.is_counting());
    }

    #[test]
    fn test_counting_variant() {
        let shape = shape().counting(true).build().unwrap();
        assert!(shape.is_counting());
        assert!(shape.to_string().starts_with("counting interface Shape"));
    }

    #[test]
    fn test_duplicate_method() {
        let result = shape()
            .pure(Declaration::new::<(), f64>("area").receiver::<Shape>(ParamKind::Ref))
            .build();

        assert_eq!(
            result,
            Err(Error::DuplicateMethod {
                owner: "Shape",
                method: "area"
            })
        );
    }

    #[test]
    fn test_invalid_receiver() {
        let result = Interface::builder("Factory")
            .pure(Declaration::new::<(u32,), ()>("make").param::<u32>("id"))
            .build();

        assert_eq!(
            result,
            Err(Error::InvalidReceiver {
                interface: "Factory",
                owner: "Factory",
                method: "make"
            })
        );
    }

    #[test]
    fn test_synthesize_preserves_order() {
        let shape = shape().build().unwrap();
        let layout = VTableLayout::synthesize(&shape);

        let names: Vec<_> = layout.slots().iter().map(|s| s.name).collect();
        assert_eq!(names, ["area", "name", "scale"]);
        assert_eq!(layout.position("scale"), Some(2));
        assert_eq!(layout.slots()[0].signature, *shape.methods()[0].signature());
    }

    #[test]
    fn test_synthesize_is_pure() {
        let shape = shape().build().unwrap();
        assert_eq!(VTableLayout::synthesize(&shape), VTableLayout::synthesize(&shape));
    }

    #[test]
    fn test_instantiate_unset() {
        let layout = VTableLayout::synthesize(&shape().build().unwrap());
        let slots = layout.instantiate();

        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(Option::is_none));
    }
}

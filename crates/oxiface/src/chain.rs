//! Inheritance chain resolution.

use crate::class::Class;
use crate::interface::Interface;
use std::fmt;

/// The ancestors of a concrete class, most derived first, ending at the
/// root interface.
///
/// For `NamedCircle: Circle: Shape` the chain is
/// `[NamedCircle, Circle]` with root `Shape`.
#[derive(Debug, Clone)]
pub struct Chain {
    classes: Vec<&'static Class>,
    root: &'static Interface,
}

impl Chain {
    /// Walks `class`'s base links up to the root interface.
    #[must_use]
    pub fn resolve(class: &'static Class) -> Self {
        let classes: Vec<_> = std::iter::once(class).chain(class.ancestors()).collect();

        Chain {
            classes,
            root: class.interface(),
        }
    }

    /// Returns the classes, most derived first.
    #[must_use]
    pub fn classes(&self) -> &[&'static Class] {
        &self.classes
    }

    /// Returns the class at `index` (0 is the most derived).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'static Class> {
        self.classes.get(index).copied()
    }

    #[must_use]
    pub fn most_derived(&self) -> &'static Class {
        self.classes[0]
    }

    #[must_use]
    pub fn root(&self) -> &'static Interface {
        self.root
    }

    /// Number of class levels (the root interface is not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Always `false`: a chain holds at least the class it was resolved from.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in &self.classes {
            write!(f, "{} -> ", class.name())?;
        }
        write!(f, "{}", self.root.name())
    }
}

//! Error types for the `OxIface` object model.
//!
//! Structural errors are produced while interface descriptors, class
//! descriptors and vtables are built, before any instance exists. Runtime
//! errors come from handle construction (allocation), sharing, and the
//! string-named dispatch path.

use oxiface_mem::AllocError;
use std::fmt;

/// Errors that can occur in the `OxIface` object model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A declared method's first parameter is not a receiver pointer.
    InvalidReceiver {
        /// The interface the method belongs to.
        interface: &'static str,
        /// The interface or class declaring the method.
        owner: &'static str,
        /// The method name.
        method: &'static str,
    },

    /// An implementation's erased signature differs from its vtable slot.
    VTableTypeMismatch {
        /// The interface declaring the slot.
        interface: &'static str,
        /// The method name.
        method: &'static str,
        /// The slot signature.
        expected: String,
        /// The implementation signature.
        actual: String,
        /// The inheritance chain being built, most derived first.
        chain: String,
    },

    /// No class in the chain implements an interface method.
    PureVirtualUnimplemented {
        /// The interface declaring the method.
        interface: &'static str,
        /// The method name.
        method: &'static str,
    },

    /// A derived class redeclares a field of one of its ancestors.
    FieldOverrideConflict {
        /// The root interface of the hierarchy.
        interface: &'static str,
        /// The class redeclaring the field.
        class: &'static str,
        /// The field name.
        field: &'static str,
        /// The ancestor that already declares it.
        ancestor: &'static str,
    },

    /// A method name appears twice in one interface or class.
    DuplicateMethod {
        /// The interface or class.
        owner: &'static str,
        /// The method name.
        method: &'static str,
    },

    /// The allocator could not provide memory.
    Allocation(AllocError),

    /// `share` was called on a handle without a reference count.
    NotCounting {
        /// The handle's interface.
        interface: &'static str,
    },

    /// Reference count overflow detected.
    RefCountOverflow,

    /// The interface has no method with this name.
    MethodNotFound {
        /// The handle's interface.
        interface: &'static str,
        /// The requested method name.
        method: String,
    },

    /// Argument or return types of a call do not match the slot.
    CallSignatureMismatch {
        /// The handle's interface.
        interface: &'static str,
        /// The method name.
        method: &'static str,
        /// The slot's argument tuple and return type.
        expected: String,
        /// The caller's argument tuple and return type.
        actual: String,
    },

    /// A `&mut self` method was called through a shared borrow.
    MutableReceiver {
        /// The handle's interface.
        interface: &'static str,
        /// The method name.
        method: &'static str,
    },

    /// A `&mut self` method was called through a handle whose object is
    /// also reachable from other handles.
    SharedReceiver {
        /// The handle's interface.
        interface: &'static str,
        /// The method name.
        method: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidReceiver {
                interface,
                owner,
                method,
            } => {
                write!(
                    f,
                    "Invalid receiver: {owner}::{method} (interface {interface}) must take &self or &mut self"
                )
            }
            Error::VTableTypeMismatch {
                interface,
                method,
                expected,
                actual,
                chain,
            } => {
                write!(
                    f,
                    "VTable type mismatch for {interface}::{method}: expected `{expected}`, found `{actual}` (chain: {chain})"
                )
            }
            Error::PureVirtualUnimplemented { interface, method } => {
                write!(f, "Pure virtual method {interface}::{method} is not implemented")
            }
            Error::FieldOverrideConflict {
                interface,
                class,
                field,
                ancestor,
            } => {
                write!(
                    f,
                    "Field override conflict in {interface} hierarchy: {class}.{field} is already declared by {ancestor}"
                )
            }
            Error::DuplicateMethod { owner, method } => {
                write!(f, "Method {method} declared more than once in {owner}")
            }
            Error::Allocation(err) => write!(f, "{err}"),
            Error::NotCounting { interface } => {
                write!(f, "Handle to {interface} is not reference counted")
            }
            Error::RefCountOverflow => {
                write!(f, "Reference count overflow detected")
            }
            Error::MethodNotFound { interface, method } => {
                write!(f, "Method {method} not found in interface {interface}")
            }
            Error::CallSignatureMismatch {
                interface,
                method,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Call signature mismatch for {interface}::{method}: expected `{expected}`, found `{actual}`"
                )
            }
            Error::MutableReceiver { interface, method } => {
                write!(
                    f,
                    "Method {interface}::{method} takes &mut self and needs a mutable handle"
                )
            }
            Error::SharedReceiver { interface, method } => {
                write!(
                    f,
                    "Method {interface}::{method} takes &mut self but the object is shared"
                )
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Allocation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AllocError> for Error {
    fn from(err: AllocError) -> Self {
        Error::Allocation(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::alloc::Layout;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!(
                "{}",
                Error::PureVirtualUnimplemented {
                    interface: "Shape",
                    method: "area"
                }
            ),
            "Pure virtual method Shape::area is not implemented"
        );
        assert_eq!(
            format!("{}", Error::NotCounting { interface: "Shape" }),
            "Handle to Shape is not reference counted"
        );
        assert_eq!(
            Error::SharedReceiver {
                interface: "Resource",
                method: "touch"
            }
            .to_string(),
            "Method Resource::touch takes &mut self but the object is shared"
        );
    }

    #[test]
    fn test_mismatch_names_chain() {
        let err = Error::VTableTypeMismatch {
            interface: "Shape",
            method: "area",
            expected: "fn(*const (), ()) -> f64".to_string(),
            actual: "fn(*mut (), ()) -> f64".to_string(),
            chain: "Circle -> Shape".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("Shape::area"));
        assert!(msg.contains("fn(*mut (), ()) -> f64"));
        assert!(msg.contains("Circle -> Shape"));
    }

    #[test]
    fn test_allocation_source() {
        let alloc = AllocError::new(Layout::new::<u64>());
        let err = Error::from(alloc);

        assert_eq!(err, Error::Allocation(alloc));
        assert!(err.source().is_some());
        assert!(Error::RefCountOverflow.source().is_none());
    }
}

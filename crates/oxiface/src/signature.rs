//! Method signature analysis.
//!
//! Every virtual method is described by a [`Declaration`]: its name, its
//! parameter list with the receiver first, the packed argument tuple type,
//! and the return type. [`analyze`] erases the receiver into a
//! [`Constness`] and produces the [`Signature`] that vtable slots and thunks
//! are compared by.
//!
//! # Erasure
//!
//! | Receiver              | Erased as   |
//! |-----------------------|-------------|
//! | `&self`, `*const Self`| `*const ()` |
//! | `&mut self`, `*mut Self` | `*mut ()` |
//! | anything else         | rejected with [`Error::InvalidReceiver`] |
//!
//! The remaining parameters are packed in declaration order into a tuple,
//! so `fn scale(&mut self, x: f64, y: f64)` erases to
//! `fn(*mut (), (f64, f64)) -> ()`.

use crate::error::{Error, Result};
use std::any::{self, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Runtime description of a `'static` type.
///
/// Two descriptors are equal when they describe the same type; the name is
/// only used for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TypeDesc {
    id: TypeId,
    name: &'static str,
}

impl TypeDesc {
    /// Describes `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeDesc {
            id: TypeId::of::<T>(),
            name: any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if this describes `T`.
    #[must_use]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeDesc {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDesc {}

impl Hash for TypeDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Constness of an erased receiver pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constness {
    /// `*const ()`
    Const,
    /// `*mut ()`
    Mut,
}

impl fmt::Display for Constness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constness::Const => f.write_str("*const ()"),
            Constness::Mut => f.write_str("*mut ()"),
        }
    }
}

/// How a parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// By value (`self`, `x: T`).
    Value,
    /// `&T`
    Ref,
    /// `&mut T`
    RefMut,
    /// `*const T`
    ConstPtr,
    /// `*mut T`
    MutPtr,
}

impl ParamKind {
    /// Returns the erased receiver constness, or `None` if this kind cannot
    /// be a receiver.
    #[must_use]
    pub fn receiver(self) -> Option<Constness> {
        match self {
            ParamKind::Ref | ParamKind::ConstPtr => Some(Constness::Const),
            ParamKind::RefMut | ParamKind::MutPtr => Some(Constness::Mut),
            ParamKind::Value => None,
        }
    }
}

/// A declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub ty: TypeDesc,
    pub kind: ParamKind,
}

/// A method as written: name, parameters (receiver first), argument tuple
/// and return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    name: &'static str,
    params: Vec<Param>,
    args: TypeDesc,
    ret: TypeDesc,
}

impl Declaration {
    /// Starts a declaration whose non-receiver parameters pack into `A` and
    /// whose return type is `R`.
    ///
    /// Parameters are appended with [`receiver`](Self::receiver) and
    /// [`param`](Self::param) in declaration order.
    ///
    /// # Example
    ///
    /// ```
    /// use oxiface::{Constness, Declaration, ParamKind, analyze};
    ///
    /// struct Circle;
    ///
    /// let decl = Declaration::new::<(f64,), ()>("scale")
    ///     .receiver::<Circle>(ParamKind::RefMut)
    ///     .param::<f64>("factor");
    ///
    /// let sig = analyze(&decl, "Shape", "Circle").unwrap();
    /// assert_eq!(sig.receiver(), Constness::Mut);
    /// assert_eq!(sig.to_string(), "fn(*mut (), (f64,)) -> ()");
    /// ```
    #[must_use]
    pub fn new<A: 'static, R: 'static>(name: &'static str) -> Self {
        Declaration {
            name,
            params: Vec::new(),
            args: TypeDesc::of::<A>(),
            ret: TypeDesc::of::<R>(),
        }
    }

    /// Appends a receiver parameter of type `T` passed as `kind`.
    #[must_use]
    pub fn receiver<T: ?Sized + 'static>(mut self, kind: ParamKind) -> Self {
        self.params.push(Param {
            name: "self",
            ty: TypeDesc::of::<T>(),
            kind,
        });
        self
    }

    /// Appends a by-value parameter.
    #[must_use]
    pub fn param<T: 'static>(mut self, name: &'static str) -> Self {
        self.params.push(Param {
            name,
            ty: TypeDesc::of::<T>(),
            kind: ParamKind::Value,
        });
        self
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

/// Positional arguments of an erased call: the element types and the tuple
/// they are packed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgPack {
    elements: Vec<TypeDesc>,
    tuple: TypeDesc,
}

impl ArgPack {
    #[must_use]
    pub fn elements(&self) -> &[TypeDesc] {
        &self.elements
    }

    #[must_use]
    pub fn tuple(&self) -> TypeDesc {
        self.tuple
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Erased call signature: `fn(receiver, args) -> ret`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    receiver: Constness,
    args: ArgPack,
    ret: TypeDesc,
}

impl Signature {
    #[must_use]
    pub fn receiver(&self) -> Constness {
        self.receiver
    }

    #[must_use]
    pub fn args(&self) -> &ArgPack {
        &self.args
    }

    #[must_use]
    pub fn ret(&self) -> TypeDesc {
        self.ret
    }

    /// Returns `true` if a caller passing `A` and expecting `R` matches.
    #[must_use]
    pub fn accepts<A: 'static, R: 'static>(&self) -> bool {
        self.args.tuple.is::<A>() && self.ret.is::<R>()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn({}, {}) -> {}", self.receiver, self.args.tuple, self.ret)
    }
}

/// Derives the erased [`Signature`] of `decl`.
///
/// `interface` and `owner` only name the declaration in errors.
///
/// # Errors
///
/// Returns [`Error::InvalidReceiver`] if `decl` has no parameters or its first
/// parameter is not a reference or pointer.
pub fn analyze(decl: &Declaration, interface: &'static str, owner: &'static str) -> Result<Signature> {
    let invalid = || Error::InvalidReceiver {
        interface,
        owner,
        method: decl.name,
    };

    let (first, rest) = decl.params.split_first().ok_or_else(invalid)?;
    let receiver = first.kind.receiver().ok_or_else(invalid)?;

    Ok(Signature {
        receiver,
        args: ArgPack {
            elements: rest.iter().map(|p| p.ty).collect(),
            tuple: decl.args,
        },
        ret: decl.ret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Owner;

    #[test]
    fn test_const_receiver() {
        let decl = Declaration::new::<(), f64>("area").receiver::<Owner>(ParamKind::Ref);
        let sig = analyze(&decl, "Shape", "Owner").unwrap();

        assert_eq!(sig.receiver(), Constness::Const);
        assert!(sig.args().is_empty());
        assert!(sig.ret().is::<f64>());
        assert_eq!(sig.to_string(), "fn(*const (), ()) -> f64");
    }

    #[test]
    fn test_args_packed_in_order() {
        let decl = Declaration::new::<(u32, &'static str), bool>("set")
            .receiver::<Owner>(ParamKind::MutPtr)
            .param::<u32>("index")
            .param::<&'static str>("label");
        let sig = analyze(&decl, "Shape", "Owner").unwrap();

        assert_eq!(sig.receiver(), Constness::Mut);
        assert_eq!(sig.args().len(), 2);
        assert!(sig.args().elements()[0].is::<u32>());
        assert!(sig.args().elements()[1].is::<&'static str>());
        assert!(sig.accepts::<(u32, &'static str), bool>());
        assert!(!sig.accepts::<(u32,), bool>());
    }

    #[test]
    fn test_by_value_receiver_rejected() {
        let decl = Declaration::new::<(), ()>("consume").receiver::<Owner>(ParamKind::Value);

        assert_eq!(
            analyze(&decl, "Shape", "Owner"),
            Err(Error::InvalidReceiver {
                interface: "Shape",
                owner: "Owner",
                method: "consume",
            })
        );
    }

    #[test]
    fn test_missing_receiver_rejected() {
        let empty = Declaration::new::<(), ()>("make");
        assert!(matches!(
            analyze(&empty, "Shape", "Owner"),
            Err(Error::InvalidReceiver { method: "make", .. })
        ));

        let plain = Declaration::new::<(i32,), ()>("make").param::<i32>("x");
        assert!(analyze(&plain, "Shape", "Owner").is_err());
    }

    #[test]
    fn test_signature_equality_ignores_receiver_type() {
        struct Other;

        let a = Declaration::new::<(), f64>("area").receiver::<Owner>(ParamKind::Ref);
        let b = Declaration::new::<(), f64>("area").receiver::<Other>(ParamKind::ConstPtr);
        let c = Declaration::new::<(), f32>("area").receiver::<Other>(ParamKind::Ref);

        let a = analyze(&a, "Shape", "Owner").unwrap();
        let b = analyze(&b, "Shape", "Other").unwrap();
        let c = analyze(&c, "Shape", "Other").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

//! Pointer-adjusting call thunks.
//!
//! A [`Thunk`] forwards an erased call to the ancestor that owns a method.
//! Classes embed their base by value, so reaching an ancestor from the
//! concrete object is a sequence of `base` field offsets. The thunk records
//! those offsets ("hops") when the vtable is built and applies them on each
//! call:
//!
//! ```text
//! NamedCircle @ p
//!   base: Circle @ p + offset_of!(NamedCircle, base)
//!     base: Shape @ ... + offset_of!(Circle, base)
//! ```
//!
//! No vtable is consulted while hopping; the adjustment mirrors the embedded
//! layout exactly.

use crate::chain::Chain;
use crate::class::Imp;
use crate::signature::Signature;

/// Forwarding entry stored in a vtable slot.
#[derive(Debug, Clone)]
pub struct Thunk {
    owner: &'static str,
    method: &'static str,
    imp: Imp,
    hops: Box<[usize]>,
    signature: Signature,
}

impl Thunk {
    /// Returns the class whose implementation is called.
    #[must_use]
    pub fn owner(&self) -> &'static str {
        self.owner
    }

    #[must_use]
    pub fn method(&self) -> &'static str {
        self.method
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns the `base` offsets applied to the receiver, outermost first.
    #[must_use]
    pub fn hops(&self) -> &[usize] {
        &self.hops
    }

    /// Returns the total receiver adjustment in bytes.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.hops.iter().sum()
    }

    /// Returns `true` if the receiver is passed through unadjusted.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.hops.is_empty()
    }

    /// Calls the owner's implementation.
    ///
    /// # Safety
    ///
    /// - `this` must point to a live instance of the chain's most derived
    ///   class, valid for writes if the method takes `&mut self`
    /// - `args` must point to an initialized value of the argument tuple
    ///   type, which the callee moves out
    /// - `ret` must be valid for a write of the return type
    pub unsafe fn invoke(&self, this: *mut (), args: *mut u8, ret: *mut u8) {
        let mut ptr = this.cast::<u8>();
        for &hop in &self.hops {
            // SAFETY: each hop is the offset of an embedded base field, so
            // the result stays inside the object
            ptr = unsafe { ptr.add(hop) };
        }

        // SAFETY: ptr addresses the owner sub-object (see above); args and
        // ret are guaranteed by the caller
        unsafe {
            match self.imp {
                Imp::Const(f) => f(ptr.cast_const().cast(), args, ret),
                Imp::Mut(f) => f(ptr.cast(), args, ret),
            }
        }
    }
}

/// Generates the thunk for `method` as seen from chain level `index`.
///
/// At level 0 the most derived class is the owner and the receiver is
/// passed through. Otherwise the search starts at the most derived class
/// and descends through `base` fields until a class declaring `method` is
/// found, recording each level's base offset on the way.
///
/// # Panics
///
/// Panics if no class in the chain declares `method`. The vtable builder only
/// asks for methods some level declares, so this indicates a broken chain.
#[must_use]
pub fn generate(chain: &Chain, index: usize, method: &str) -> Thunk {
    let classes = chain.classes();
    let mut hops = Vec::new();

    let found = if index == 0 {
        classes.first().and_then(|c| c.declares(method).map(|m| (c, m)))
    } else {
        classes.iter().find_map(|class| match class.declares(method) {
            Some(m) => Some((class, m)),
            None => {
                hops.push(class.base_offset());
                None
            }
        })
    };

    let Some((owner, imp)) = found else {
        panic!("no class in chain {chain} declares {method}");
    };

    Thunk {
        owner: owner.name(),
        method: imp.name(),
        imp: imp.imp(),
        hops: hops.into_boxed_slice(),
        signature: imp.signature().clone(),
    }
}

//! Interface handles.
//!
//! A [`Handle`] is the fat pointer callers dispatch through:
//!
//! ```text
//! Handle<'a, I>
//! ├── vtable:    &'static VTable          (shared, process lifetime)
//! ├── object:    NonNull<()>              (erased concrete instance)
//! ├── allocator: Option<&'a dyn Allocator> (None for non-owning handles)
//! └── refcount:  Option<NonNull<Cell<usize>>> (counting interfaces only)
//! ```
//!
//! # Ownership
//!
//! - [`Handle::new`] moves an instance into memory from the injected
//!   allocator. The handle owns it and frees it on drop.
//! - For a counting interface, [`Handle::share`] hands out further owners of
//!   the same instance. The instance and the counter are freed once, when
//!   the last owner is dropped.
//! - [`Handle::interface`] borrows an existing object. Dropping it does
//!   nothing.
//!
//! # Thread Safety
//!
//! Handles are neither `Send` nor `Sync`. The shared count is a plain
//! `Cell`, so sharing across threads is rejected at compile time.

use crate::class::ClassType;
use crate::error::{Error, Result};
use crate::interface::InterfaceType;
use crate::signature::Constness;
use crate::thunk::Thunk;
use crate::vtable::VTable;
use oxiface_log::{debug, trace};
use oxiface_mem::Allocator;
use std::any::{self, TypeId};
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ptr::NonNull;

/// A polymorphic reference to an object implementing interface `I`.
pub struct Handle<'a, I: InterfaceType> {
    vtable: &'static VTable,
    object: NonNull<()>,
    allocator: Option<&'a dyn Allocator>,
    refcount: Option<NonNull<Cell<usize>>>,
    _marker: PhantomData<(fn() -> I, *mut (), &'a mut ())>,
}

impl<'a, I: InterfaceType> Handle<'a, I> {
    /// Moves `instance` into memory from `allocator` and returns an owning
    /// handle.
    ///
    /// The vtable is built (or fetched from the cache) before anything is
    /// allocated. For a counting interface the shared counter is allocated
    /// first and starts at 1.
    ///
    /// # Errors
    ///
    /// - Any structural error from building `T`'s vtable
    /// - [`Error::Allocation`] if the allocator fails; nothing is leaked
    pub fn new<T>(instance: T, allocator: &'a dyn Allocator) -> Result<Self>
    where
        T: ClassType<Interface = I>,
    {
        let vtable = VTable::of::<T>()?;

        let refcount = if vtable.interface().is_counting() {
            Some(allocator.create(Cell::new(1usize))?)
        } else {
            None
        };

        let object = match allocator.create(instance) {
            Ok(object) => object,
            Err(err) => {
                if let Some(count) = refcount {
                    // SAFETY: count was created above and never shared
                    unsafe { allocator.destroy(count) };
                }
                return Err(err.into());
            }
        };

        trace!("new {} handle to {}", vtable.interface().name(), vtable.class().name());

        Ok(Handle {
            vtable,
            object: object.cast(),
            allocator: Some(allocator),
            refcount,
            _marker: PhantomData,
        })
    }

    /// Returns a non-owning handle to `object`.
    ///
    /// The caller keeps ownership; dropping the handle does nothing.
    ///
    /// # Errors
    ///
    /// Any structural error from building `T`'s vtable.
    pub fn interface<T>(object: &'a mut T) -> Result<Self>
    where
        T: ClassType<Interface = I>,
    {
        Ok(Handle {
            vtable: VTable::of::<T>()?,
            object: NonNull::from(object).cast(),
            allocator: None,
            refcount: None,
            _marker: PhantomData,
        })
    }

    /// Calls a `&self` method by name.
    ///
    /// `A` is the tuple of arguments after the receiver and `R` the return
    /// type; both must match the interface declaration exactly.
    ///
    /// # Example
    ///
    /// ```
    /// use oxiface::{Handle, Heap, class, interface};
    ///
    /// interface! {
    ///     pub interface Shape {
    ///         fn area(&self) -> f64;
    ///     }
    /// }
    ///
    /// class! {
    ///     pub struct Square: Shape {
    ///         pub side: f64,
    ///     }
    ///     impl {
    ///         fn area(&self) -> f64 {
    ///             self.side * self.side
    ///         }
    ///     }
    /// }
    ///
    /// let heap = Heap;
    /// let square = Handle::new(Square { base: Shape, side: 3.0 }, &heap).unwrap();
    /// let area: f64 = square.virtual_call("area", ()).unwrap();
    /// assert_eq!(area, 9.0);
    /// ```
    ///
    /// # Errors
    ///
    /// - [`Error::MethodNotFound`] if the interface has no such method
    /// - [`Error::CallSignatureMismatch`] if `A` or `R` differ from the slot
    /// - [`Error::MutableReceiver`] if the method takes `&mut self`
    pub fn virtual_call<A: 'static, R: 'static>(&self, method: &str, args: A) -> Result<R> {
        let thunk = self.checked_slot::<A, R>(method)?;
        if thunk.signature().receiver() == Constness::Mut {
            return Err(Error::MutableReceiver {
                interface: self.interface_name(),
                method: thunk.method(),
            });
        }

        // SAFETY: the slot signature matches A and R, and the receiver is
        // only read
        Ok(unsafe { self.dispatch(thunk, args) })
    }

    /// Calls a `&self` or `&mut self` method by name.
    ///
    /// `&mut self` methods need the only handle to the object, as with
    /// [`Rc::get_mut`](std::rc::Rc::get_mut).
    ///
    /// # Errors
    ///
    /// - [`Error::MethodNotFound`] if the interface has no such method
    /// - [`Error::CallSignatureMismatch`] if `A` or `R` differ from the slot
    /// - [`Error::SharedReceiver`] if the method takes `&mut self` and the
    ///   object has been shared
    pub fn virtual_call_mut<A: 'static, R: 'static>(&mut self, method: &str, args: A) -> Result<R> {
        let thunk = self.checked_slot::<A, R>(method)?;
        if thunk.signature().receiver() == Constness::Mut && !self.is_unique() {
            return Err(Error::SharedReceiver {
                interface: self.interface_name(),
                method: thunk.method(),
            });
        }

        // SAFETY: the slot signature matches A and R, and a mutating
        // receiver is only passed by the sole handle, borrowed mutably
        Ok(unsafe { self.dispatch(thunk, args) })
    }

    fn checked_slot<A: 'static, R: 'static>(&self, method: &str) -> Result<&'static Thunk> {
        let thunk = self.vtable.slot(method).ok_or_else(|| Error::MethodNotFound {
            interface: self.interface_name(),
            method: method.to_string(),
        })?;

        if !thunk.signature().accepts::<A, R>() {
            let signature = thunk.signature();
            return Err(Error::CallSignatureMismatch {
                interface: self.interface_name(),
                method: thunk.method(),
                expected: format!("{} -> {}", signature.args().tuple(), signature.ret()),
                actual: format!("{} -> {}", any::type_name::<A>(), any::type_name::<R>()),
            });
        }

        Ok(thunk)
    }

    /// # Safety
    ///
    /// `thunk` must come from this handle's vtable and accept `A` and `R`.
    unsafe fn dispatch<A, R>(&self, thunk: &Thunk, args: A) -> R {
        trace!("dispatch {}::{} -> {}", self.interface_name(), thunk.method(), thunk.owner());

        // The callee moves the arguments out of `args`.
        let mut args = ManuallyDrop::new(args);
        let mut ret = MaybeUninit::<R>::uninit();

        // SAFETY: object is live for the handle's lifetime; args holds an A
        // and ret has room for an R (guaranteed by the caller)
        unsafe {
            thunk.invoke(
                self.object.as_ptr(),
                (&raw mut args).cast(),
                ret.as_mut_ptr().cast(),
            );
            ret.assume_init()
        }
    }

    /// Returns another owner of the same object.
    ///
    /// # Errors
    ///
    /// - [`Error::NotCounting`] if the handle has no shared count
    /// - [`Error::RefCountOverflow`] if the count would overflow
    pub fn share(&self) -> Result<Self> {
        let Some(count) = self.refcount else {
            return Err(Error::NotCounting {
                interface: self.interface_name(),
            });
        };

        // SAFETY: the count lives as long as any owning handle
        let cell = unsafe { count.as_ref() };
        let next = cell.get().checked_add(1).ok_or(Error::RefCountOverflow)?;
        cell.set(next);

        Ok(Handle {
            vtable: self.vtable,
            object: self.object,
            allocator: self.allocator,
            refcount: self.refcount,
            _marker: PhantomData,
        })
    }

    /// Releases this handle. Same as dropping it.
    pub fn destroy(self) {
        drop(self);
    }

    /// Returns the shared count, or `None` for uncounted handles.
    #[must_use]
    pub fn refcount(&self) -> Option<usize> {
        // SAFETY: the count lives as long as any owning handle
        self.refcount.map(|count| unsafe { count.as_ref() }.get())
    }

    /// Returns `true` if no other handle reaches the object.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.refcount().is_none_or(|count| count == 1)
    }

    /// Returns `true` if dropping this handle may free the object.
    #[must_use]
    pub fn is_owning(&self) -> bool {
        self.allocator.is_some()
    }

    /// Returns the concrete class name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.vtable.class().name()
    }

    #[must_use]
    pub fn interface_name(&self) -> &'static str {
        self.vtable.interface().name()
    }

    #[must_use]
    pub fn vtable(&self) -> &'static VTable {
        self.vtable
    }

    /// Returns the erased object pointer.
    #[must_use]
    pub fn as_ptr(&self) -> *const () {
        self.object.as_ptr()
    }

    /// Returns `true` if both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.object == other.object
    }

    /// Returns the object if its concrete type is `T`.
    #[must_use]
    pub fn downcast_ref<T: ClassType>(&self) -> Option<&T> {
        if self.vtable.class().type_id() != TypeId::of::<T>() {
            return None;
        }

        // SAFETY: the vtable was built for T, so object points to a T
        Some(unsafe { self.object.cast::<T>().as_ref() })
    }

    /// Returns the object mutably if its concrete type is `T` and this is
    /// the only handle to it.
    #[must_use]
    pub fn downcast_mut<T: ClassType>(&mut self) -> Option<&mut T> {
        if self.vtable.class().type_id() != TypeId::of::<T>() || !self.is_unique() {
            return None;
        }

        // SAFETY: as in downcast_ref; self is the sole handle and is
        // borrowed mutably
        Some(unsafe { self.object.cast::<T>().as_mut() })
    }

    /// Returns the embedded sub-object of type `T`, which may be the
    /// concrete class or any of its ancestors.
    #[must_use]
    pub fn ancestor_ref<T: ClassType>(&self) -> Option<&T> {
        let target = TypeId::of::<T>();
        let mut offset = 0;

        for class in self.vtable.chain().classes() {
            if class.type_id() == target {
                // SAFETY: offset is the sum of the base offsets leading to
                // the embedded T
                return Some(unsafe { self.object.cast::<u8>().add(offset).cast::<T>().as_ref() });
            }
            offset += class.base_offset();
        }

        None
    }

    /// Runs the destructor and returns the object's memory.
    ///
    /// # Safety
    ///
    /// No other handle may use the object afterwards.
    unsafe fn free_object(&self, allocator: &dyn Allocator) {
        debug!("destroying {} instance", self.type_name());

        // SAFETY: object holds a live instance laid out as the vtable says,
        // allocated from `allocator`
        unsafe {
            (self.vtable.drop_fn())(self.object.as_ptr());
            allocator.deallocate(self.object.cast(), self.vtable.object_layout());
        }
    }
}

impl<I: InterfaceType> Drop for Handle<'_, I> {
    fn drop(&mut self) {
        let Some(allocator) = self.allocator else {
            return;
        };

        match self.refcount {
            None => {
                // SAFETY: an uncounted owning handle is the only owner
                unsafe { self.free_object(allocator) };
            }
            Some(count) => {
                // SAFETY: the count lives as long as any owning handle
                let cell = unsafe { count.as_ref() };
                let remaining = cell.get() - 1;
                cell.set(remaining);

                if remaining > 0 {
                    trace!("released {} handle, {remaining} left", self.type_name());
                    return;
                }

                // SAFETY: this was the last owner
                unsafe {
                    self.free_object(allocator);
                    allocator.destroy(count);
                }
            }
        }
    }
}

impl<I: InterfaceType> fmt::Debug for Handle<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("interface", &self.interface_name())
            .field("class", &self.type_name())
            .field("object", &self.object)
            .field("owning", &self.is_owning())
            .field("refcount", &self.refcount())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxiface_mem::{Heap, TrackingAllocator};

    crate::interface! {
        counting interface Counter {
            fn get(&self) -> u64;
            fn add(&mut self, by: u64) -> u64;
        }
    }

    crate::interface! {
        interface Plain {
            fn get(&self) -> u64;
        }
    }

    crate::class! {
        struct Cumulative: Counter {
            total: u64,
        }
        impl {
            fn get(&self) -> u64 {
                self.total
            }

            fn add(&mut self, by: u64) -> u64 {
                self.total += by;
                self.total
            }
        }
    }

    crate::class! {
        struct Constant: Plain {
            value: u64,
        }
        impl {
            fn get(&self) -> u64 {
                self.value
            }
        }
    }

    fn cumulative(total: u64) -> Cumulative {
        Cumulative {
            base: Counter,
            total,
        }
    }

    #[test]
    fn test_call_and_mutate() {
        let heap = Heap;
        let mut handle = Handle::new(cumulative(1), &heap).unwrap();

        assert_eq!(handle.virtual_call::<(), u64>("get", ()).unwrap(), 1);
        assert_eq!(handle.virtual_call_mut::<(u64,), u64>("add", (4,)).unwrap(), 5);
        assert_eq!(handle.virtual_call_mut::<(), u64>("get", ()).unwrap(), 5);
        assert_eq!(handle.downcast_ref::<Cumulative>().unwrap().total, 5);
    }

    #[test]
    fn test_mutable_receiver_needs_mut_handle() {
        let heap = Heap;
        let handle = Handle::new(cumulative(0), &heap).unwrap();

        assert_eq!(
            handle.virtual_call::<(u64,), u64>("add", (1,)),
            Err(Error::MutableReceiver {
                interface: "Counter",
                method: "add"
            })
        );
    }

    #[test]
    fn test_shared_object_is_read_only() {
        let heap = Heap;
        let mut handle = Handle::new(cumulative(2), &heap).unwrap();
        assert!(handle.is_unique());

        let other = handle.share().unwrap();
        assert!(!handle.is_unique());
        assert_eq!(
            handle.virtual_call_mut::<(u64,), u64>("add", (1,)),
            Err(Error::SharedReceiver {
                interface: "Counter",
                method: "add"
            })
        );
        assert_eq!(handle.virtual_call_mut::<(), u64>("get", ()).unwrap(), 2);
        assert!(handle.downcast_mut::<Cumulative>().is_none());

        drop(other);
        assert_eq!(handle.virtual_call_mut::<(u64,), u64>("add", (1,)).unwrap(), 3);
    }

    #[test]
    fn test_call_type_checks() {
        let heap = Heap;
        let handle = Handle::new(cumulative(0), &heap).unwrap();

        assert!(matches!(
            handle.virtual_call::<(), u32>("get", ()),
            Err(Error::CallSignatureMismatch { method: "get", .. })
        ));
        assert!(matches!(
            handle.virtual_call::<(u64,), u64>("get", (1,)),
            Err(Error::CallSignatureMismatch { .. })
        ));
        assert_eq!(
            handle.virtual_call::<(), u64>("reset", ()),
            Err(Error::MethodNotFound {
                interface: "Counter",
                method: "reset".to_string()
            })
        );
    }

    #[test]
    fn test_counting_handle_frees_once() {
        let tracker = TrackingAllocator::new();
        let handle = Handle::new(cumulative(7), &tracker).unwrap();
        assert_eq!(handle.refcount(), Some(1));
        assert_eq!(tracker.stats().live, 2);

        let shared = handle.share().unwrap();
        assert_eq!(handle.refcount(), Some(2));
        assert!(shared.ptr_eq(&handle));

        handle.destroy();
        assert_eq!(shared.refcount(), Some(1));
        assert_eq!(shared.virtual_call::<(), u64>("get", ()).unwrap(), 7);
        assert_eq!(tracker.stats().live, 2);

        drop(shared);
        tracker.assert_no_leaks();
    }

    #[test]
    fn test_plain_handle() {
        let tracker = TrackingAllocator::new();
        let handle = Handle::new(
            Constant {
                base: Plain,
                value: 3,
            },
            &tracker,
        )
        .unwrap();

        assert_eq!(handle.refcount(), None);
        assert!(handle.is_owning());
        assert_eq!(tracker.stats().live, 1);
        assert_eq!(
            handle.share().unwrap_err(),
            Error::NotCounting { interface: "Plain" }
        );

        drop(handle);
        tracker.assert_no_leaks();
    }

    #[test]
    fn test_non_owning_handle() {
        let mut object = cumulative(2);
        {
            let mut handle = Handle::interface(&mut object).unwrap();
            assert!(!handle.is_owning());
            assert!(handle.share().is_err());
            handle.virtual_call_mut::<(u64,), u64>("add", (3,)).unwrap();
        }
        assert_eq!(object.total, 5);
    }

    #[test]
    fn test_failed_allocation_frees_counter() {
        let tracker = TrackingAllocator::new();
        tracker.fail_after(1);

        let result = Handle::new(cumulative(0), &tracker);
        assert!(matches!(result, Err(Error::Allocation(_))));

        let stats = tracker.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.failures, 1);
        tracker.assert_no_leaks();
    }

    #[test]
    fn test_debug_output() {
        let heap = Heap;
        let handle = Handle::new(cumulative(0), &heap).unwrap();
        let debug = format!("{handle:?}");

        assert!(debug.contains("Counter"));
        assert!(debug.contains("Cumulative"));
        assert_eq!(handle.type_name(), "Cumulative");
        assert_eq!(handle.interface_name(), "Counter");
    }
}

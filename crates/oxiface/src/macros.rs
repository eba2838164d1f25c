//! Declaration macros.
//!
//! [`interface!`] and [`class!`] record what the object model needs to know
//! about a type: method declarations, field names, the offset of the
//! embedded base, and erased implementations. Everything else is checked
//! when descriptors and vtables are built.
//!
//! # Limitations
//!
//! - Receivers of interface methods must be written `&self` or
//!   `&mut self`. Other forms are accepted syntactically and rejected with
//!   [`Error::InvalidReceiver`](crate::Error::InvalidReceiver). Methods the
//!   interface does not name, constructors included, stay inherent and are
//!   left out of the descriptor.
//! - Parameter and return types of methods taking `&self` or `&mut self`
//!   must be `'static` and must not mention `Self`. Prefer `&'static str`
//!   over `&str`.
//! - Parameters are plain `name: Type` bindings; patterns are not supported.

/// Declares an interface marker type.
///
/// Expands to a zero-sized struct implementing
/// [`InterfaceType`](crate::InterfaceType) and [`Base`](crate::Base), so
/// root classes can embed it as their `base`.
///
/// ```
/// use oxiface::{InterfaceType, interface};
///
/// interface! {
///     /// Anything with an area.
///     pub interface Shape {
///         fn area(&self) -> f64;
///         fn name(&self) -> &'static str;
///     }
/// }
///
/// interface! {
///     pub counting interface Resource {
///         fn id(&self) -> u32;
///     }
/// }
///
/// assert_eq!(Shape::descriptor().unwrap().methods().len(), 2);
/// assert!(Resource::descriptor().unwrap().is_counting());
/// ```
#[macro_export]
macro_rules! interface {
    (
        $(#[$meta:meta])*
        $vis:vis counting interface $name:ident {
            $($body:tt)*
        }
    ) => {
        $crate::__interface!(@emit [$(#[$meta])*] [$vis] $name true { $($body)* });
    };
    (
        $(#[$meta:meta])*
        $vis:vis interface $name:ident {
            $($body:tt)*
        }
    ) => {
        $crate::__interface!(@emit [$(#[$meta])*] [$vis] $name false { $($body)* });
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __interface {
    (
        @emit [$($attr:tt)*] [$vis:vis] $name:ident $counting:literal {
            $(
                $(#[$mmeta:meta])*
                fn $m:ident ( $($params:tt)* ) $(-> $ret:ty)? ;
            )*
        }
    ) => {
        $($attr)*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $name;

        impl $crate::InterfaceType for $name {
            fn descriptor() -> $crate::Result<&'static $crate::Interface> {
                static DESCRIPTOR: ::std::sync::OnceLock<$crate::Result<$crate::Interface>> =
                    ::std::sync::OnceLock::new();

                DESCRIPTOR
                    .get_or_init(|| {
                        $crate::Interface::builder(::core::stringify!($name))
                            .counting($counting)
                            $(.pure($crate::__method!(@decl $name; $m; ($($params)*); $($ret)?)))*
                            .build()
                    })
                    .as_ref()
                    .map_err(::core::clone::Clone::clone)
            }
        }

        impl $crate::Base for $name {
            type Interface = $name;

            fn link() -> $crate::Result<$crate::Link> {
                <$name as $crate::InterfaceType>::descriptor().map($crate::Link::Interface)
            }
        }
    };
}

/// Declares a class embedding `Parent` as its `base`.
///
/// The struct gets a `pub base: Parent` field ahead of the listed fields,
/// an inherent impl with the listed methods, and implementations of
/// [`ClassType`](crate::ClassType) and [`Base`](crate::Base). Methods whose
/// names match interface methods override them; others are plain inherent
/// methods.
///
/// ```
/// use oxiface::{ClassType, class, interface};
///
/// interface! {
///     pub interface Shape {
///         fn area(&self) -> f64;
///     }
/// }
///
/// class! {
///     pub struct Circle: Shape {
///         pub radius: f64,
///     }
///     impl {
///         pub fn area(&self) -> f64 {
///             std::f64::consts::PI * self.radius * self.radius
///         }
///     }
/// }
///
/// class! {
///     pub struct Ring: Circle {
///         pub inner: f64,
///     }
///     impl {}
/// }
///
/// let ring = Ring { base: Circle { base: Shape, radius: 2.0 }, inner: 1.0 };
/// assert_eq!(ring.upcast().radius, 2.0);
/// assert_eq!(Ring::descriptor().unwrap().base().name(), "Circle");
/// ```
#[macro_export]
macro_rules! class {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $parent:ty {
            $($fvis:vis $field:ident : $fty:ty),* $(,)?
        }
        impl {
            $(
                $(#[$mmeta:meta])*
                $mvis:vis fn $m:ident ( $($params:tt)* ) $(-> $ret:ty)? $body:block
            )*
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            pub base: $parent,
            $($fvis $field: $fty,)*
        }

        impl $name {
            $(
                $(#[$mmeta])*
                $mvis fn $m($($params)*) $(-> $ret)? $body
            )*
        }

        unsafe impl $crate::ClassType for $name {
            type Parent = $parent;

            fn descriptor() -> $crate::Result<&'static $crate::Class> {
                static DESCRIPTOR: ::std::sync::OnceLock<$crate::Result<$crate::Class>> =
                    ::std::sync::OnceLock::new();

                DESCRIPTOR
                    .get_or_init(|| {
                        $crate::Class::builder::<$name>(
                            ::core::stringify!($name),
                            <$parent as $crate::Base>::link()?,
                            ::core::mem::offset_of!($name, base),
                        )
                        .fields(&[$(::core::stringify!($field)),*])
                        $(.method(
                            $crate::__method!(@decl $name; $m; ($($params)*); $($ret)?),
                            $crate::__method!(@imp $name; $m; ($($params)*); $($ret)?),
                        ))*
                        .build()
                    })
                    .as_ref()
                    .map_err(::core::clone::Clone::clone)
            }

            fn upcast(&self) -> &$parent {
                &self.base
            }

            fn upcast_mut(&mut self) -> &mut $parent {
                &mut self.base
            }
        }

        impl $crate::Base for $name {
            type Interface = <$parent as $crate::Base>::Interface;

            fn link() -> $crate::Result<$crate::Link> {
                <$name as $crate::ClassType>::descriptor().map($crate::Link::Class)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __method {
    // Declarations
    (@decl $owner:ty; $m:ident; (&self $(, $arg:ident : $aty:ty)* $(,)?); $($ret:ty)?) => {
        $crate::Declaration::new::<($($aty,)*), $crate::__ret!($($ret)?)>(::core::stringify!($m))
            .receiver::<$owner>($crate::ParamKind::Ref)
            $(.param::<$aty>(::core::stringify!($arg)))*
    };
    (@decl $owner:ty; $m:ident; (&mut self $(, $arg:ident : $aty:ty)* $(,)?); $($ret:ty)?) => {
        $crate::Declaration::new::<($($aty,)*), $crate::__ret!($($ret)?)>(::core::stringify!($m))
            .receiver::<$owner>($crate::ParamKind::RefMut)
            $(.param::<$aty>(::core::stringify!($arg)))*
    };
    (@decl $owner:ty; $m:ident; ($(mut)? self $(, $arg:ident : $aty:ty)* $(,)?); $($ret:ty)?) => {
        $crate::Declaration::new::<($($aty,)*), $crate::__ret!($($ret)?)>(::core::stringify!($m))
            .receiver::<$owner>($crate::ParamKind::Value)
            $(.param::<$aty>(::core::stringify!($arg)))*
    };
    (@decl $owner:ty; $m:ident; ($($arg:ident : $aty:ty),* $(,)?); $($ret:ty)?) => {
        $crate::Declaration::new::<($($aty,)*), $crate::__ret!($($ret)?)>(::core::stringify!($m))
            $(.param::<$aty>(::core::stringify!($arg)))*
    };

    // Erased implementations
    (@imp $owner:ty; $m:ident; (&self $(, $arg:ident : $aty:ty)* $(,)?); $($ret:ty)?) => {
        ::core::option::Option::Some($crate::Imp::Const({
            unsafe fn imp(this: *const (), args: *mut u8, ret: *mut u8) {
                // SAFETY: the vtable passes a live receiver, an initialized
                // argument tuple and room for the return value
                unsafe {
                    #[allow(unused_variables)]
                    let ($($arg,)*) = args.cast::<($($aty,)*)>().read();
                    let out: $crate::__ret!($($ret)?) = <$owner>::$m(&*this.cast::<$owner>() $(, $arg)*);
                    ret.cast::<$crate::__ret!($($ret)?)>().write(out);
                }
            }
            imp
        }))
    };
    (@imp $owner:ty; $m:ident; (&mut self $(, $arg:ident : $aty:ty)* $(,)?); $($ret:ty)?) => {
        ::core::option::Option::Some($crate::Imp::Mut({
            unsafe fn imp(this: *mut (), args: *mut u8, ret: *mut u8) {
                // SAFETY: as for &self, and the receiver is exclusive
                unsafe {
                    #[allow(unused_variables)]
                    let ($($arg,)*) = args.cast::<($($aty,)*)>().read();
                    let out: $crate::__ret!($($ret)?) = <$owner>::$m(&mut *this.cast::<$owner>() $(, $arg)*);
                    ret.cast::<$crate::__ret!($($ret)?)>().write(out);
                }
            }
            imp
        }))
    };
    (@imp $owner:ty; $m:ident; ($($params:tt)*); $($ret:ty)?) => {
        ::core::option::Option::None
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __ret {
    () => { () };
    ($ret:ty) => { $ret };
}

//! Build-time validation tests.
//!
//! Each broken hierarchy must be rejected before any instance is allocated,
//! with an error naming the interface and the offending member.

mod common;

use common::*;
use oxiface::{
    ClassType, Error, Handle, Heap, InterfaceType, TrackingAllocator, VTable, VTableBuilder,
    class, interface, validate,
};

class! {
    struct Unfinished: Shape {
        radius: f64,
    }
    impl {
        fn area(&self) -> f64 {
            self.radius
        }

        fn scale(&mut self, factor: f64) {
            self.radius *= factor;
        }
    }
}

class! {
    struct Shadowing: Circle {
        radius: f64,
    }
    impl {}
}

class! {
    struct DeepShadowing: NamedCircle {
        radius: f32,
    }
    impl {}
}

class! {
    struct WrongReturn: Circle {}
    impl {
        fn area(&self) -> f32 {
            1.0
        }
    }
}

class! {
    struct WrongReceiver: Circle {}
    impl {
        fn scale(&self, factor: f64) {
            let _ = factor;
        }
    }
}

class! {
    struct WrongArgs: Circle {}
    impl {
        fn scale(&mut self, factor: f32) {
            self.base.radius *= f64::from(factor);
        }
    }
}

class! {
    struct Consuming: Circle {}
    impl {
        fn name(self) -> &'static str {
            "consumed"
        }
    }
}

class! {
    struct Constructed: Shape {
        radius: f64,
    }
    impl {
        pub fn new(radius: f64) -> Self {
            Constructed { base: Shape, radius }
        }

        fn area(&self) -> f64 {
            self.radius * self.radius
        }

        fn name(&self) -> &'static str {
            "Constructed"
        }

        fn scale(&mut self, factor: f64) {
            self.radius *= factor;
        }

        fn diameter(&self) -> f64 {
            self.radius * 2.0
        }
    }
}

interface! {
    interface Twice {
        fn run(&self);
        fn run(&self);
    }
}

#[test]
fn test_missing_method_rejected() {
    assert_eq!(
        validate::<Unfinished>(),
        Err(Error::PureVirtualUnimplemented {
            interface: "Shape",
            method: "name"
        })
    );
}

#[test]
fn test_handle_not_created_for_incomplete_class() {
    let tracker = TrackingAllocator::new();
    let result = Handle::new(
        Unfinished {
            base: Shape,
            radius: 1.0,
        },
        &tracker,
    );

    assert!(matches!(result, Err(Error::PureVirtualUnimplemented { .. })));
    assert_eq!(tracker.stats().allocations, 0);
}

#[test]
fn test_field_collision_rejected() {
    assert_eq!(
        Shadowing::descriptor().unwrap_err(),
        Error::FieldOverrideConflict {
            interface: "Shape",
            class: "Shadowing",
            field: "radius",
            ancestor: "Circle",
        }
    );
}

#[test]
fn test_field_collision_with_grandparent() {
    assert!(matches!(
        validate::<DeepShadowing>(),
        Err(Error::FieldOverrideConflict {
            class: "DeepShadowing",
            field: "radius",
            ancestor: "Circle",
            ..
        })
    ));
}

#[test]
fn test_return_type_mismatch() {
    let err = validate::<WrongReturn>().unwrap_err();

    assert!(matches!(
        &err,
        Error::VTableTypeMismatch {
            interface: "Shape",
            method: "area",
            chain,
            ..
        } if chain == "WrongReturn -> Circle -> Shape"
    ));
    assert!(err.to_string().contains("f32"));
}

#[test]
fn test_receiver_constness_mismatch() {
    match validate::<WrongReceiver>() {
        Err(Error::VTableTypeMismatch {
            method,
            expected,
            actual,
            ..
        }) => {
            assert_eq!(method, "scale");
            assert!(expected.starts_with("fn(*mut ()"));
            assert!(actual.starts_with("fn(*const ()"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_argument_mismatch() {
    assert!(matches!(
        validate::<WrongArgs>(),
        Err(Error::VTableTypeMismatch { method: "scale", .. })
    ));
}

#[test]
fn test_by_value_receiver_rejected() {
    assert_eq!(
        validate::<Consuming>(),
        Err(Error::InvalidReceiver {
            interface: "Shape",
            owner: "Consuming",
            method: "name"
        })
    );
}

#[test]
fn test_constructor_and_helpers_allowed() {
    validate::<Constructed>().unwrap();

    let class = Constructed::descriptor().unwrap();
    assert!(class.declares("new").is_none());
    assert!(class.declares("diameter").is_none());

    let heap = Heap;
    let mut shape = Handle::new(Constructed::new(2.0), &heap).unwrap();
    shape.virtual_call_mut::<(f64,), ()>("scale", (1.5,)).unwrap();
    assert_eq!(shape.virtual_call::<(), f64>("area", ()).unwrap(), 9.0);
    assert_eq!(shape.downcast_ref::<Constructed>().unwrap().diameter(), 6.0);
}

#[test]
fn test_duplicate_interface_method() {
    assert_eq!(
        Twice::descriptor().unwrap_err(),
        Error::DuplicateMethod {
            owner: "Twice",
            method: "run"
        }
    );
}

#[test]
fn test_errors_repeat_on_every_attempt() {
    let first = validate::<Unfinished>();
    let second = VTable::of::<Unfinished>().map(|_| ());
    assert_eq!(first, second);
}

#[test]
fn test_builder_reports_partial_fill() {
    let class = Unfinished::descriptor().unwrap();
    let mut builder = VTableBuilder::new(class);
    builder.fill().unwrap();

    assert_eq!(builder.slot("area").unwrap().owner(), "Unfinished");
    assert!(builder.slot("name").is_none());
    assert!(builder.finish().is_err());
}

#[test]
fn test_valid_hierarchies() {
    validate::<Circle>().unwrap();
    validate::<NamedCircle>().unwrap();
    validate::<Child>().unwrap();
    validate::<Tracked>().unwrap();
    assert!(Resource::descriptor().unwrap().is_counting());
}

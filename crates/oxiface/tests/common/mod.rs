// Common test fixtures for integration tests
//
// This module provides the shape hierarchy, a three-level hierarchy for
// pointer adjustment checks, and a counting interface whose objects record
// their drops.

#![allow(dead_code)]

use oxiface::{class, interface};
use std::cell::Cell;
use std::rc::Rc;

interface! {
    /// Anything with an area.
    pub interface Shape {
        fn area(&self) -> f64;
        fn name(&self) -> &'static str;
        fn scale(&mut self, factor: f64);
    }
}

class! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Circle: Shape {
        pub radius: f64,
    }
    impl {
        pub fn area(&self) -> f64 {
            std::f64::consts::PI * self.radius * self.radius
        }

        pub fn name(&self) -> &'static str {
            "Circle"
        }

        pub fn scale(&mut self, factor: f64) {
            self.radius *= factor;
        }
    }
}

class! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct NamedCircle: Circle {
        pub label: &'static str,
    }
    impl {
        pub fn name(&self) -> &'static str {
            "NamedCircle"
        }
    }
}

/// Creates a circle of the given radius.
pub fn circle(radius: f64) -> Circle {
    Circle {
        base: Shape,
        radius,
    }
}

/// Creates a named circle of the given radius.
pub fn named_circle(radius: f64) -> NamedCircle {
    NamedCircle {
        base: circle(radius),
        label: "unit",
    }
}

interface! {
    pub interface Locator {
        fn address(&self) -> usize;
        fn depth(&self) -> u32;
    }
}

class! {
    pub struct Grand: Locator {
        pub tag: u8,
    }
    impl {
        fn address(&self) -> usize {
            std::ptr::from_ref(self).addr()
        }

        fn depth(&self) -> u32 {
            0
        }
    }
}

class! {
    pub struct Parent: Grand {
        pub weight: u64,
    }
    impl {
        fn depth(&self) -> u32 {
            1
        }
    }
}

class! {
    pub struct Child: Parent {
        pub flags: u16,
        pub name: &'static str,
    }
    impl {}
}

/// Creates a three-level object with distinct field values.
pub fn child() -> Child {
    Child {
        base: Parent {
            base: Grand {
                base: Locator,
                tag: 7,
            },
            weight: 42,
        },
        flags: 3,
        name: "child",
    }
}

interface! {
    pub counting interface Resource {
        fn id(&self) -> u32;
        fn touch(&mut self) -> u32;
    }
}

class! {
    pub struct Tracked: Resource {
        pub id: u32,
        pub touches: u32,
        pub drops: Rc<Cell<u32>>,
    }
    impl {
        fn id(&self) -> u32 {
            self.id
        }

        fn touch(&mut self) -> u32 {
            self.touches += 1;
            self.touches
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

/// Creates a tracked resource and the counter its drops are recorded in.
pub fn tracked(id: u32) -> (Tracked, Rc<Cell<u32>>) {
    let drops = Rc::new(Cell::new(0));
    let resource = Tracked {
        base: Resource,
        id,
        touches: 0,
        drops: Rc::clone(&drops),
    };
    (resource, drops)
}

//! Test that tuples are allowed in components.

use chunk_ecs::{Component, ComponentCategory, prelude::Zeroable};

#[derive(Component, Clone, Copy, Zeroable)]
struct Point2D(f32, f32);

#[derive(Component, Clone, Copy, Zeroable)]
struct WithTuple {
    coords: (i32, i32),
}

#[derive(Component, Clone, Copy)]
#[component(tag)]
struct Unit;

// SAFETY: zero-sized.
unsafe impl Zeroable for Unit {}

fn main() {
    assert_eq!(<Unit as chunk_ecs::Component>::CATEGORY, ComponentCategory::Tag);
}

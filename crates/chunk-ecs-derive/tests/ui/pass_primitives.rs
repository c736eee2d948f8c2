//! Test that primitive types are allowed in components.

use chunk_ecs::{Component, ComponentCategory, prelude::Zeroable};

#[derive(Component, Clone, Copy, Zeroable)]
struct AllPrimitives {
    a: i8,
    b: i16,
    c: i32,
    d: i64,
    e: i128,
    f: isize,
    g: u8,
    h: u16,
    i: u32,
    j: u64,
    k: u128,
    l: usize,
    m: f32,
    n: f64,
    o: bool,
}

#[derive(Component, Clone, Copy, Zeroable)]
struct Position {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Component, Clone, Copy, Zeroable)]
struct Health {
    current: u32,
    max: u32,
}

fn main() {
    assert_eq!(
        <Position as chunk_ecs::Component>::CATEGORY,
        ComponentCategory::PlainData
    );
    assert!(<Health as chunk_ecs::Component>::FLAGS.is_empty());
    assert_eq!(<AllPrimitives as chunk_ecs::Component>::INLINE_CAPACITY, None);
}

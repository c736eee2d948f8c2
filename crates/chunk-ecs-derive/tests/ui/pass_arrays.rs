//! Test that fixed-size arrays are allowed in components.

use chunk_ecs::{Component, prelude::Zeroable};

#[derive(Component, Clone, Copy, Zeroable)]
struct FixedName {
    data: [u8; 32],
}

#[derive(Component, Clone, Copy, Zeroable)]
struct Matrix3x3 {
    values: [[f32; 3]; 3],
}

#[derive(Component, Clone, Copy, Zeroable)]
struct ChunkKey {
    bytes: [u8; 13],
}

#[derive(Component, Clone, Copy, Zeroable)]
struct Uuid {
    bytes: [u8; 16],
}

fn main() {}

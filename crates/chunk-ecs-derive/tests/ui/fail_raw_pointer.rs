//! Raw pointers are forbidden in components.

use chunk_ecs_derive::Component;

#[derive(Component, Clone, Copy)]
struct Handle {
    ptr: *const u8,
}

fn main() {}

//! A component has exactly one storage category.

use chunk_ecs_derive::Component;

#[derive(Component, Clone, Copy)]
#[component(tag, chunk)]
struct Frozen;

fn main() {}

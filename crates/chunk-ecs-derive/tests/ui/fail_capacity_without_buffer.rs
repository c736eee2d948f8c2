//! `capacity` is only meaningful for buffer components.

use chunk_ecs_derive::Component;

#[derive(Component, Clone, Copy)]
#[component(capacity = 4)]
struct Sample(u8);

fn main() {}

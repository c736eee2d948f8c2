//! References are forbidden in components.

use chunk_ecs_derive::Component;

#[derive(Component)]
struct WithRef<'a> {
    data: &'a [u8],
}

fn main() {}

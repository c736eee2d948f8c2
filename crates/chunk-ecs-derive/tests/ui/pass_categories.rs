//! Test that the component attribute selects category, flags and capacity.

use chunk_ecs::{
    Component, ComponentCategory, DEFAULT_BUFFER_CAPACITY, Entity, TypeFlags, World,
    prelude::{Pod, Zeroable},
};

#[derive(Component, Clone, Copy, Zeroable, Pod)]
#[repr(C)]
#[component(buffer(capacity = 8))]
struct Waypoint(i32);

#[derive(Component, Clone, Copy, Zeroable, Pod)]
#[repr(C)]
#[component(buffer)]
struct Sample(u16);

#[derive(Component, Clone, Copy, Zeroable)]
#[component(chunk)]
struct Bounds {
    min: [f32; 3],
    max: [f32; 3],
}

#[derive(Component, Clone, Copy, Zeroable)]
#[component(shared)]
struct Team(u32);

#[derive(Component, Clone, Copy, Zeroable)]
#[component(system_state, no_clone)]
struct Replicated {
    slot: u32,
}

#[derive(Component, Clone, Copy)]
#[component(system_state)]
#[component(tag)]
struct Registered;

// SAFETY: zero-sized.
unsafe impl Zeroable for Registered {}

#[derive(Component, Clone, Copy, Zeroable)]
struct Target {
    entity: Entity,
}

fn main() {
    assert_eq!(<Waypoint as Component>::CATEGORY, ComponentCategory::Buffer);
    assert_eq!(<Waypoint as Component>::INLINE_CAPACITY, Some(8));
    assert_eq!(<Sample as Component>::INLINE_CAPACITY, None);
    assert_eq!(<Bounds as Component>::CATEGORY, ComponentCategory::ChunkData);
    assert_eq!(<Team as Component>::CATEGORY, ComponentCategory::SharedData);
    assert_eq!(
        <Replicated as Component>::FLAGS,
        TypeFlags::SYSTEM_STATE | TypeFlags::NON_CLONEABLE
    );
    assert_eq!(<Registered as Component>::CATEGORY, ComponentCategory::Tag);
    assert_eq!(<Registered as Component>::FLAGS, TypeFlags::SYSTEM_STATE);

    let world = World::new();
    let samples = world.type_info(world.register::<Sample>().unwrap()).unwrap();
    assert_eq!(samples.inline_capacity(), DEFAULT_BUFFER_CAPACITY);
    assert!(world.register::<Target>().is_ok());
}

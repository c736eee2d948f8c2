//! Dynamic buffer behaviour through the public world API.

use chunk_ecs::{
    AccessViolation, Component, DEFAULT_BUFFER_CAPACITY, EcsError, Entity, ErrorKind, World,
    prelude::{Pod, Zeroable},
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
#[component(buffer(capacity = 8))]
struct Slot(i32);

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
#[component(buffer)]
struct Word(u32);

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
#[component(buffer(capacity = 8))]
struct Pair(u16);

#[derive(Component, Debug, Clone, Copy, PartialEq, Zeroable)]
struct Marker(u32);

fn slot_entity() -> (World, Entity) {
    init_tracing();
    let mut world = World::new();
    let entity = world.create_entity_with::<Slot>().unwrap();
    (world, entity)
}

fn values(world: &World, entity: Entity) -> Vec<i32> {
    world
        .get_buffer::<Slot>(entity)
        .unwrap()
        .to_vec()
        .unwrap()
        .into_iter()
        .map(|slot| slot.0)
        .collect()
}

fn fill(world: &World, entity: Entity, items: impl IntoIterator<Item = i32>) {
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();
    for item in items {
        buffer.add(Slot(item)).unwrap();
    }
}

// ==================== Growth ====================

#[test]
fn test_new_buffer_is_empty_inline() {
    let (world, entity) = slot_entity();
    let buffer = world.get_buffer::<Slot>(entity).unwrap();
    assert_eq!(buffer.len().unwrap(), 0);
    assert!(buffer.is_empty().unwrap());
    assert_eq!(buffer.capacity().unwrap(), 8);
    assert!(!buffer.is_overflowed().unwrap());
}

#[test]
fn test_default_inline_capacity() {
    init_tracing();
    let mut world = World::new();
    let entity = world.create_entity_with::<Word>().unwrap();
    let buffer = world.get_buffer::<Word>(entity).unwrap();
    assert_eq!(buffer.capacity().unwrap(), DEFAULT_BUFFER_CAPACITY);
    assert_eq!(buffer.capacity().unwrap(), 32);
}

#[test]
fn test_many_adds_overflow_to_heap() {
    let (world, entity) = slot_entity();
    fill(&world, entity, 0..189);

    let buffer = world.get_buffer::<Slot>(entity).unwrap();
    assert_eq!(buffer.len().unwrap(), 189);
    assert!(buffer.capacity().unwrap() >= 189);
    assert!(buffer.is_overflowed().unwrap());
    for i in 0..189 {
        assert_eq!(buffer.get(i).unwrap(), Slot(i as i32));
    }
}

#[test]
fn test_growth_doubles_capacity() {
    let (world, entity) = slot_entity();
    fill(&world, entity, 0..9);
    let buffer = world.get_buffer::<Slot>(entity).unwrap();
    assert_eq!(buffer.capacity().unwrap(), 16);
}

#[test]
fn test_trim_moves_back_inline() {
    let (world, entity) = slot_entity();
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();
    buffer.add_range(&[Slot(1), Slot(2), Slot(3)]).unwrap();
    buffer.ensure_capacity(100).unwrap();
    assert_eq!(buffer.capacity().unwrap(), 100);
    assert!(buffer.is_overflowed().unwrap());

    buffer.trim_excess().unwrap();
    assert_eq!(buffer.capacity().unwrap(), 8);
    assert_eq!(buffer.len().unwrap(), 3);
    assert!(!buffer.is_overflowed().unwrap());
    assert_eq!(values(&world, entity), vec![1, 2, 3]);
}

#[test]
fn test_trim_shrinks_heap_to_length() {
    let (world, entity) = slot_entity();
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();
    buffer.resize(10).unwrap();
    assert_eq!(buffer.capacity().unwrap(), 16);

    buffer.trim_excess().unwrap();
    assert_eq!(buffer.capacity().unwrap(), 10);
    assert_eq!(buffer.len().unwrap(), 10);

    buffer.trim_excess().unwrap();
    assert_eq!(buffer.capacity().unwrap(), 10);
}

#[test]
fn test_resize_zero_fills() {
    let (world, entity) = slot_entity();
    fill(&world, entity, [7, 7]);
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();
    buffer.resize(1).unwrap();
    buffer.resize(4).unwrap();
    assert_eq!(values(&world, entity), vec![7, 0, 0, 0]);
}

// ==================== Editing ====================

#[test]
fn test_insert_pattern() {
    let (world, entity) = slot_entity();
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();
    for i in 0..5 {
        buffer.add(Slot(i)).unwrap();
    }
    buffer.insert(0, Slot(-1)).unwrap();
    buffer.insert(3, Slot(100)).unwrap();
    let len = buffer.len().unwrap();
    buffer.insert(len, Slot(99)).unwrap();

    assert_eq!(values(&world, entity), vec![-1, 0, 1, 100, 2, 3, 4, 99]);

    let err = buffer.insert(100, Slot(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
}

#[test]
fn test_insert_past_inline_capacity() {
    let (world, entity) = slot_entity();
    fill(&world, entity, 0..8);
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();
    buffer.insert(4, Slot(42)).unwrap();
    assert!(buffer.is_overflowed().unwrap());
    assert_eq!(values(&world, entity), vec![0, 1, 2, 3, 42, 4, 5, 6, 7]);
}

#[test]
fn test_remove_at_variants() {
    let (world, entity) = slot_entity();
    fill(&world, entity, [0, 1, 2]);
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();
    assert_eq!(buffer.remove_at_swap_back(0).unwrap(), Slot(0));
    assert_eq!(values(&world, entity), vec![2, 1]);

    fill(&world, entity, [5, 6]);
    assert_eq!(buffer.remove_at(1).unwrap(), Slot(1));
    assert_eq!(values(&world, entity), vec![2, 5, 6]);

    assert_eq!(
        buffer.remove_at(3).unwrap_err(),
        EcsError::IndexOutOfRange {
            index: 3,
            count: 1,
            len: 3
        }
    );
}

#[test]
fn test_remove_range() {
    let (world, entity) = slot_entity();
    fill(&world, entity, 0..10);
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();

    buffer.remove_range(2, 3).unwrap();
    assert_eq!(values(&world, entity), vec![0, 1, 5, 6, 7, 8, 9]);

    buffer.remove_range(5, 2).unwrap();
    assert_eq!(values(&world, entity), vec![0, 1, 5, 6, 7]);

    // Zero-length ranges are no-ops, even at the end.
    buffer.remove_range(5, 0).unwrap();
    buffer.remove_range(0, 0).unwrap();
    assert_eq!(buffer.len().unwrap(), 5);

    let err = buffer.remove_range(3, 3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    let err = buffer.remove_range(6, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    let err = buffer.remove_range(usize::MAX, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
}

#[test]
fn test_remove_range_swap_back() {
    let (world, entity) = slot_entity();
    fill(&world, entity, 0..10);
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();

    // Three elements after the hole, two removed: the last two fill it.
    buffer.remove_range_swap_back(5, 2).unwrap();
    assert_eq!(values(&world, entity), vec![0, 1, 2, 3, 4, 8, 9, 7]);

    // Fewer trailing elements than removed: all of them move.
    buffer.remove_range_swap_back(0, 5).unwrap();
    assert_eq!(values(&world, entity), vec![8, 9, 7]);

    buffer.remove_range_swap_back(1, 2).unwrap();
    assert_eq!(values(&world, entity), vec![8]);
}

#[test]
fn test_copy_from_and_clear() {
    let (world, entity) = slot_entity();
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();
    let items: Vec<Slot> = (0..20).map(Slot).collect();
    buffer.copy_from(&items).unwrap();
    assert_eq!(buffer.to_vec().unwrap(), items);

    let capacity = buffer.capacity().unwrap();
    buffer.clear().unwrap();
    assert!(buffer.is_empty().unwrap());
    assert_eq!(buffer.capacity().unwrap(), capacity);
}

#[test]
fn test_get_and_set() {
    let (world, entity) = slot_entity();
    fill(&world, entity, [1, 2, 3]);
    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();
    buffer.set(1, Slot(20)).unwrap();
    assert_eq!(buffer.get(1).unwrap(), Slot(20));
    assert_eq!(buffer.get(3).unwrap_err().kind(), ErrorKind::IndexOutOfRange);
    assert_eq!(
        buffer.set(3, Slot(0)).unwrap_err().kind(),
        ErrorKind::IndexOutOfRange
    );
}

// ==================== Reinterpret ====================

#[test]
fn test_reinterpret_requires_equal_size() {
    let (world, entity) = slot_entity();
    fill(&world, entity, [1, -1]);
    let buffer = world.get_buffer::<Slot>(entity).unwrap();

    let err = buffer.reinterpret::<u16>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let mut raw = buffer.reinterpret::<u32>().unwrap();
    assert_eq!(raw.get(1).unwrap(), u32::MAX);
    raw.set(0, 5).unwrap();
    raw.add(6).unwrap();
    assert_eq!(values(&world, entity), vec![5, -1, 6]);
}

// ==================== Handle Safety ====================

#[test]
fn test_handle_stale_after_destroy() {
    let (mut world, entity) = slot_entity();
    let buffer = world.get_buffer::<Slot>(entity).unwrap();
    world.destroy_entity(entity).unwrap();
    assert_eq!(buffer.len().unwrap_err().kind(), ErrorKind::StaleView);
}

#[test]
fn test_handle_stale_after_add_component() {
    let (mut world, entity) = slot_entity();
    fill(&world, entity, 0..20);
    let stale = world.get_buffer::<Slot>(entity).unwrap();

    let marker = world.register::<Marker>().unwrap();
    assert!(world.add_component(entity, marker).unwrap());
    assert_eq!(stale.to_vec().unwrap_err().kind(), ErrorKind::StaleView);

    // The data moved with the entity, heap block included.
    let fresh = world.get_buffer::<Slot>(entity).unwrap();
    assert_eq!(fresh.len().unwrap(), 20);
    assert_eq!(fresh.get(19).unwrap(), Slot(19));
}

#[test]
fn test_handle_stale_after_neighbour_moves() {
    init_tracing();
    let mut world = World::new();
    let archetype = world.archetype_for::<Slot>().unwrap();
    let entities = world.create_entities(archetype, 2).unwrap();
    let handle = world.get_buffer::<Slot>(entities[0]).unwrap();

    world.destroy_entity(entities[1]).unwrap();
    assert_eq!(handle.len().unwrap_err().kind(), ErrorKind::StaleView);
}

#[test]
fn test_array_invalidated_by_other_buffer_in_chunk() {
    init_tracing();
    let mut world = World::new();
    let archetype = world.archetype_for::<(Slot, Pair)>().unwrap();
    let entities = world.create_entities(archetype, 2).unwrap();
    fill(&world, entities[0], [1, 2, 3]);

    let array = world
        .get_buffer::<Slot>(entities[0])
        .unwrap()
        .as_array()
        .unwrap();
    assert_eq!(array.len(), 3);
    assert_eq!(array.get(2).unwrap(), Slot(3));

    // Element writes keep the array valid.
    let mut own = world.get_buffer::<Slot>(entities[0]).unwrap();
    own.set(0, Slot(10)).unwrap();
    assert_eq!(array.get(0).unwrap(), Slot(10));

    // A length change of another buffer in the same chunk does not.
    world
        .get_buffer::<Pair>(entities[1])
        .unwrap()
        .add(Pair(1))
        .unwrap();
    assert_eq!(array.get(0).unwrap_err().kind(), ErrorKind::StaleView);
    assert_eq!(array.to_vec().unwrap_err().kind(), ErrorKind::StaleView);
}

#[test]
fn test_read_only_handles_reject_writes() {
    let (world, entity) = slot_entity();
    fill(&world, entity, [1, 2]);

    let mut read_only = world.get_buffer_read_only::<Slot>(entity).unwrap();
    assert!(read_only.is_read_only());
    assert_eq!(read_only.len().unwrap(), 2);
    assert_eq!(read_only.add(Slot(3)).unwrap_err().kind(), ErrorKind::AccessViolation);
    assert_eq!(read_only.clear().unwrap_err().kind(), ErrorKind::AccessViolation);

    let mut array = read_only.as_array().unwrap();
    assert!(array.is_read_only());
    let err = array.set(0, Slot(0)).unwrap_err();
    assert!(matches!(
        err,
        EcsError::AccessViolation {
            violation: AccessViolation::ReadOnly,
            ..
        }
    ));

    let lookup = world.buffer_lookup::<Slot>(true).unwrap();
    assert!(lookup.is_read_only());
    assert!(lookup.get(entity).unwrap().is_read_only());
}

#[test]
fn test_pinned_array_blocks_mutation() {
    let (mut world, entity) = slot_entity();
    fill(&world, entity, [4, 5, 6]);

    let pinned = world
        .get_buffer::<Slot>(entity)
        .unwrap()
        .as_array()
        .unwrap()
        .pin()
        .unwrap();

    let sum = std::thread::scope(|scope| {
        scope
            .spawn(|| pinned.as_slice().unwrap().iter().map(|s| s.0).sum::<i32>())
            .join()
            .unwrap()
    });
    assert_eq!(sum, 15);

    let mut buffer = world.get_buffer::<Slot>(entity).unwrap();
    assert_eq!(buffer.add(Slot(7)).unwrap_err().kind(), ErrorKind::AccessViolation);
    assert_eq!(buffer.len().unwrap(), 3);

    let marker = world.register::<Marker>().unwrap();
    assert_eq!(
        world.add_component(entity, marker).unwrap_err().kind(),
        ErrorKind::AccessViolation
    );
    assert_eq!(
        world.destroy_entity(entity).unwrap_err().kind(),
        ErrorKind::AccessViolation
    );
    assert!(world.exists(entity));

    drop(pinned);
    buffer.add(Slot(7)).unwrap();
    assert!(world.add_component(entity, marker).unwrap());
}

#[test]
fn test_lookup() {
    init_tracing();
    let mut world = World::new();
    let with_buffer = world.create_entity_with::<Slot>().unwrap();
    let without = world.create_entity_with::<Marker>().unwrap();

    let lookup = world.buffer_lookup::<Slot>(false).unwrap();
    assert!(lookup.has_buffer(with_buffer));
    assert!(!lookup.has_buffer(without));
    assert_eq!(
        lookup.get(without).unwrap_err().kind(),
        ErrorKind::InvalidOperation
    );
    lookup.get(with_buffer).unwrap().add(Slot(1)).unwrap();
    assert_eq!(values(&world, with_buffer), vec![1]);
}

#[test]
fn test_buffers_survive_instantiate() {
    let (mut world, entity) = slot_entity();
    fill(&world, entity, 0..50);

    let copies = world.instantiate_many(entity, 3).unwrap();
    world
        .get_buffer::<Slot>(entity)
        .unwrap()
        .set(0, Slot(-5))
        .unwrap();

    for copy in copies {
        let items = values(&world, copy);
        assert_eq!(items.len(), 50);
        assert_eq!(items[0], 0);
        assert_eq!(items[49], 49);
    }
    assert_eq!(values(&world, entity)[0], -5);
}

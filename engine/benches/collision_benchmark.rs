// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::{IntoScheduleConfigs, Schedule};
use criterion::{Criterion, criterion_group, criterion_main};
use glam::Vec3;
use slotmap::SlotMap;
use std::hint::black_box;

use contact_engine::{
    Aabb, ColliderDesc, ColliderHandle, ColliderShape, PhysicsResource, PhysicsSystem,
    PhysicsWorld, RigidBodyDesc, TimeResource, TransformComponent, VelocityComponent,
    physics::dynamic_aabb_tree::DynamicAabbTree, spawn_physics_entity,
};

fn grid_positions(count: usize, spacing: f32) -> Vec<Vec3> {
    let side = (count as f32).cbrt().ceil() as usize;
    let mut positions = Vec::with_capacity(count);

    for z in 0..side {
        for y in 0..side {
            for x in 0..side {
                if positions.len() >= count {
                    return positions;
                }
                positions.push(Vec3::new(x as f32, y as f32, z as f32) * spacing);
            }
        }
    }
    positions
}

fn bench_tree_insert(c: &mut Criterion) {
    let mut handles: SlotMap<ColliderHandle, ()> = SlotMap::with_key();
    let boxes: Vec<(ColliderHandle, Aabb)> = grid_positions(1024, 3.0)
        .into_iter()
        .map(|center| (handles.insert(()), Aabb::new(center - Vec3::ONE, center + Vec3::ONE)))
        .collect();

    c.bench_function("broadphase/insert_1024", |b| {
        b.iter(|| {
            let mut tree = DynamicAabbTree::new(0.1, true);
            for (handle, aabb) in &boxes {
                tree.add(*handle, *aabb);
            }
            black_box(tree.height())
        })
    });
}

/// Floor with a layer of boxes resting on it, slightly sunk in.
fn resting_grid(side: usize) -> PhysicsWorld {
    let mut world = PhysicsWorld::default();
    let floor = world
        .add_body(
            RigidBodyDesc::fixed()
                .with_position(Vec3::new(0.0, -1.0, 0.0))
                .with_scale(Vec3::new(side as f32 * 3.0, 1.0, side as f32 * 3.0)),
        )
        .expect("valid floor");
    world
        .add_collider(floor, ColliderDesc::new(ColliderShape::unit_cube()))
        .expect("valid floor collider");

    for x in 0..side {
        for z in 0..side {
            let position = Vec3::new(
                (x as f32 - side as f32 / 2.0) * 2.5,
                0.49,
                (z as f32 - side as f32 / 2.0) * 2.5,
            );
            let body = world
                .add_body(RigidBodyDesc::dynamic(1.0).with_position(position))
                .expect("valid box");
            world
                .add_collider(body, ColliderDesc::cuboid(Vec3::splat(0.5)))
                .expect("valid box collider");
        }
    }
    world
}

fn bench_resolve_resting_grid(c: &mut Criterion) {
    let mut world = resting_grid(16);
    world.step(1.0 / 60.0);

    c.bench_function("collision/resting_grid_256", |b| {
        b.iter(|| black_box(world.step(1.0 / 60.0).contacts))
    });
}

fn bench_ecs_step(c: &mut Criterion) {
    let mut world = World::new();
    world.insert_resource(PhysicsResource::default());
    world.insert_resource(TimeResource::default());

    for position in grid_positions(512, 1.9) {
        spawn_physics_entity(
            &mut world,
            TransformComponent::from_position(position),
            VelocityComponent::default(),
            RigidBodyDesc::dynamic(1.0),
            ColliderDesc::cuboid(Vec3::ONE),
        )
        .expect("valid entity");
    }

    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            PhysicsSystem::push_transforms,
            PhysicsSystem::step,
            PhysicsSystem::pull_transforms,
        )
            .chain(),
    );
    schedule.run(&mut world);

    c.bench_function("ecs/step_512", |b| {
        b.iter(|| {
            schedule.run(&mut world);
            black_box(
                world
                    .get_resource::<PhysicsResource>()
                    .expect("PhysicsResource missing")
                    .last_stats
                    .candidate_pairs,
            );
        })
    });
}

criterion_group!(
    benches,
    bench_tree_insert,
    bench_resolve_resting_grid,
    bench_ecs_step
);
criterion_main!(benches);

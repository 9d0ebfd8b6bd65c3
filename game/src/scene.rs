// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use bevy_ecs::prelude::*;
use contact_engine::{
    ColliderDesc, ColliderShape, CollisionStateComponent, Material, PhysicsError, PhysicsResource,
    RigidBodyDesc, TimeResource, TransformComponent, VelocityComponent, spawn_physics_entity,
};
use glam::{Quat, Vec3};
use rand::Rng;

/// Tag for the bodies dropped onto the floor.
#[derive(Component, Debug, Clone, Copy)]
pub struct FallingBody {
    pub label: &'static str,
}

pub const STEPS_PER_REPORT: u64 = 60;

const FLOOR_HALF_EXTENT: f32 = 12.0;
const SETTLED_SPEED: f32 = 0.05;

pub fn spawn_floor(world: &mut World) -> Result<Entity, PhysicsError> {
    spawn_physics_entity(
        world,
        TransformComponent::from_position(Vec3::new(0.0, -1.0, 0.0)).with_scale(Vec3::new(
            FLOOR_HALF_EXTENT,
            1.0,
            FLOOR_HALF_EXTENT,
        )),
        VelocityComponent::default(),
        RigidBodyDesc::fixed(),
        ColliderDesc::new(ColliderShape::unit_cube()).with_material(Material::new(0.8, 0.4, 0.2)),
    )
}

fn random_rotation<R: Rng>(rng: &mut R) -> Quat {
    let axis = Vec3::new(
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
    )
    .normalize_or(Vec3::Y);
    Quat::from_axis_angle(axis, rng.random_range(0.0..std::f32::consts::TAU))
}

fn octahedron(radius: f32) -> Vec<Vec3> {
    [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z]
        .into_iter()
        .map(|p| p * radius)
        .collect()
}

fn wedge() -> (Vec<Vec3>, Vec<[u32; 3]>) {
    let points = vec![
        Vec3::new(-0.8, -0.4, -0.5),
        Vec3::new(0.8, -0.4, -0.5),
        Vec3::new(0.0, 0.6, -0.5),
        Vec3::new(-0.8, -0.4, 0.5),
        Vec3::new(0.8, -0.4, 0.5),
        Vec3::new(0.0, 0.6, 0.5),
    ];
    let triangles = vec![
        [0, 2, 1],
        [3, 4, 5],
        [0, 1, 4],
        [0, 4, 3],
        [1, 2, 5],
        [1, 5, 4],
        [2, 0, 3],
        [2, 3, 5],
    ];
    (points, triangles)
}

/// Drops `count` boxes plus a few convex hulls from random heights.
pub fn spawn_falling_bodies<R: Rng>(
    world: &mut World,
    rng: &mut R,
    count: usize,
) -> Result<Vec<Entity>, PhysicsError> {
    let mut entities = Vec::with_capacity(count + 2);
    let spread = FLOOR_HALF_EXTENT * 0.6;

    for i in 0..count {
        let position = Vec3::new(
            rng.random_range(-spread..spread),
            2.0 + i as f32 * 1.5,
            rng.random_range(-spread..spread),
        );
        let half_extents = Vec3::new(
            rng.random_range(0.3..0.8),
            rng.random_range(0.3..0.8),
            rng.random_range(0.3..0.8),
        );
        let transform = TransformComponent::from_position(position).with_rotation(random_rotation(rng));

        let entity = spawn_physics_entity(
            world,
            transform,
            VelocityComponent::default(),
            RigidBodyDesc::dynamic(half_extents.x * half_extents.y * half_extents.z * 8.0),
            ColliderDesc::cuboid(half_extents),
        )?;
        world.entity_mut(entity).insert(FallingBody { label: "box" });
        entities.push(entity);
    }

    let top = 2.0 + count as f32 * 1.5;
    let gem = spawn_physics_entity(
        world,
        TransformComponent::from_position(Vec3::new(0.0, top + 2.0, 0.0)).with_rotation(random_rotation(rng)),
        VelocityComponent::new(Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0)),
        RigidBodyDesc::dynamic(1.0),
        ColliderDesc::convex_hull(octahedron(0.7)).with_material(Material::frictionless(0.5)),
    )?;
    world.entity_mut(gem).insert(FallingBody { label: "octahedron" });
    entities.push(gem);

    let (points, triangles) = wedge();
    let wedge = spawn_physics_entity(
        world,
        TransformComponent::from_position(Vec3::new(1.5, top + 4.0, -1.5)),
        VelocityComponent::default(),
        RigidBodyDesc::dynamic(2.0),
        ColliderDesc::new(ColliderShape::convex_mesh(points, triangles)).with_group("props"),
    )?;
    world.entity_mut(wedge).insert(FallingBody { label: "wedge" });
    entities.push(wedge);

    Ok(entities)
}

/// Logs how many dropped bodies have come to rest, once per report interval.
pub fn report_progress(
    query: Query<(&FallingBody, &TransformComponent, &VelocityComponent, &CollisionStateComponent)>,
    time: Res<TimeResource>,
    physics: Res<PhysicsResource>,
) {
    if time.step_count() % STEPS_PER_REPORT != 0 {
        return;
    }

    let mut settled = 0;
    let mut highest = f32::NEG_INFINITY;
    for (_, transform, velocity, state) in &query {
        if state.has_collided && velocity.translational.length() < SETTLED_SPEED {
            settled += 1;
        }
        highest = highest.max(transform.position.y);
    }

    let stats = physics.last_stats;
    log::info!(
        "t = {:.1}s: {settled}/{} bodies settled, highest at {highest:.2}, {} contacts from {} candidate pairs",
        time.total_time(),
        query.iter().count(),
        stats.contacts,
        stats.candidate_pairs,
    );
}

pub fn log_final_state(world: &mut World) {
    let mut query = world.query::<(&FallingBody, &TransformComponent, &VelocityComponent)>();
    for (body, transform, velocity) in query.iter(world) {
        log::info!(
            "{:>10} at ({:6.2}, {:6.2}, {:6.2}) moving {:.3} m/s",
            body.label,
            transform.position.x,
            transform.position.y,
            transform.position.z,
            velocity.translational.length(),
        );
    }
}

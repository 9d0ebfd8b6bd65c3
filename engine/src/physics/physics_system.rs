// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use bevy_ecs::prelude::*;

use crate::{
    components::{
        collider_component::ColliderComponent, collision_state_component::CollisionStateComponent,
        rigid_body_component::RigidBodyComponent, transform_component::TransformComponent,
        velocity_component::VelocityComponent,
    },
    error::PhysicsError,
    physics::{collider::ColliderDesc, physics_resource::PhysicsResource, rigid_body::RigidBodyDesc},
    time_resource::TimeResource,
};

pub struct PhysicsSystem {}

impl PhysicsSystem {
    /// Copies transforms and velocities edited outside the simulation into
    /// their bodies.
    pub fn push_transforms(
        query: Query<
            (&RigidBodyComponent, &TransformComponent, &VelocityComponent),
            Or<(Changed<TransformComponent>, Changed<VelocityComponent>)>,
        >,
        mut physics: ResMut<PhysicsResource>,
    ) {
        for (rigid_body, transform, velocity) in &query {
            if !transform.is_finite() || !velocity.translational.is_finite() || !velocity.angular.is_finite() {
                log::warn!("Ignoring non-finite transform or velocity for {:?}", rigid_body.body);
                continue;
            }
            let Some(body) = physics.world.body_mut(rigid_body.body) else {
                continue;
            };

            body.position = transform.position;
            body.rotation = transform.rotation.normalize();
            body.scale = transform.scale;
            body.linear_velocity = velocity.translational;
            body.angular_velocity = velocity.angular;
        }
    }

    pub fn step(mut physics: ResMut<PhysicsResource>, mut time: ResMut<TimeResource>) {
        let stats = physics.world.step(time.fixed_dt());
        time.advance();

        log::trace!(
            "Physics step {}: {} colliders, {} candidate pairs, {} contacts, {} manifold failures \
             (broad {:.2?}, narrow {:.2?}, resolve {:.2?})",
            time.step_count(),
            stats.colliders,
            stats.candidate_pairs,
            stats.contacts,
            stats.manifold_failures,
            stats.broad_phase,
            stats.narrow_phase,
            stats.resolution,
        );
        physics.last_stats = stats;
    }

    /// Writes body state and the last step's contacts back to the entities.
    pub fn pull_transforms(
        mut query: Query<(
            &RigidBodyComponent,
            &mut TransformComponent,
            &mut VelocityComponent,
            Option<&ColliderComponent>,
            Option<&mut CollisionStateComponent>,
        )>,
        physics: Res<PhysicsResource>,
    ) {
        for (rigid_body, mut transform, mut velocity, collider, state) in query.iter_mut() {
            let Some(body) = physics.world.body(rigid_body.body) else {
                continue;
            };

            transform.set_if_neq(TransformComponent::from(body));
            velocity.set_if_neq(VelocityComponent::new(body.linear_velocity, body.angular_velocity));

            let (Some(collider), Some(mut state)) = (collider, state) else {
                continue;
            };
            let Some(collider) = physics.world.collider(collider.collider) else {
                continue;
            };

            let contacts = collider
                .contacts()
                .iter()
                .filter_map(|(partner, normal)| {
                    physics
                        .entity_of_collider(*partner)
                        .map(|entity| (entity, *normal))
                })
                .collect();
            state.set_if_neq(CollisionStateComponent {
                has_collided: collider.has_collided(),
                has_hard_collided: collider.has_hard_collided(),
                collision_velocity: collider.collision_velocity(),
                contacts,
            });
        }
    }
}

/// Creates a body and collider for a new entity. The body takes its
/// transform and velocity from the given components.
pub fn spawn_physics_entity(
    world: &mut World,
    transform: TransformComponent,
    velocity: VelocityComponent,
    body_desc: RigidBodyDesc,
    collider_desc: ColliderDesc,
) -> Result<Entity, PhysicsError> {
    let body_desc = body_desc
        .with_position(transform.position)
        .with_rotation(transform.rotation)
        .with_scale(transform.scale)
        .with_linear_velocity(velocity.translational)
        .with_angular_velocity(velocity.angular);

    let (body, collider) = {
        let mut physics = world.get_resource_or_insert_with(PhysicsResource::default);
        let body = physics.world.add_body(body_desc)?;
        match physics.world.add_collider(body, collider_desc) {
            Ok(collider) => (body, collider),
            Err(err) => {
                physics.world.remove_body(body);
                return Err(err);
            }
        }
    };

    let entity = world
        .spawn((
            transform,
            velocity,
            RigidBodyComponent { body },
            ColliderComponent { collider },
            CollisionStateComponent::default(),
        ))
        .id();

    if let Some(mut physics) = world.get_resource_mut::<PhysicsResource>() {
        physics.entity_of_body.insert(body, entity);
    }
    Ok(entity)
}

/// Despawns `entity` and removes its body and colliders from the simulation.
pub fn despawn_physics_entity(world: &mut World, entity: Entity) -> bool {
    let body = world.get::<RigidBodyComponent>(entity).map(|component| component.body);
    if let (Some(body), Some(mut physics)) = (body, world.get_resource_mut::<PhysicsResource>()) {
        physics.world.remove_body(body);
        physics.entity_of_body.remove(body);
    }
    world.despawn(entity)
}

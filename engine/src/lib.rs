// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

//! Collision detection and resolution for convex rigid bodies: a dynamic AABB
//! tree broad phase, SAT and GJK/EPA narrow phases, clipped contact
//! manifolds and a sequential impulse solver, with a bevy_ecs front end.

pub mod components;
pub mod config;
pub mod error;
pub mod gravity;
pub mod handles;
pub mod physics;
pub mod time_resource;
pub mod utils;

pub use components::{
    collider_component::ColliderComponent, collision_state_component::CollisionStateComponent,
    rigid_body_component::RigidBodyComponent, transform_component::TransformComponent,
    velocity_component::VelocityComponent,
};
pub use config::{CombineRule, ConfigError, PhysicsConfig};
pub use error::{ManifoldError, PhysicsError};
pub use gravity::Gravity;
pub use handles::{BodyHandle, ColliderHandle};
pub use physics::{
    aabb::Aabb,
    collider::{Collider, ColliderDesc, Material},
    collider_handler::{ColliderHandler, CollisionStats},
    manifold::ContactManifold,
    physics_resource::PhysicsResource,
    physics_system::{PhysicsSystem, despawn_physics_entity, spawn_physics_entity},
    physics_world::PhysicsWorld,
    rigid_body::{BodyType, RigidBody, RigidBodyDesc, RigidBodySet},
    shape::ColliderShape,
};
pub use time_resource::TimeResource;

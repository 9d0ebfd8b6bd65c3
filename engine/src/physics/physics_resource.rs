// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use bevy_ecs::prelude::*;
use slotmap::SecondaryMap;

use crate::{
    config::PhysicsConfig,
    handles::{BodyHandle, ColliderHandle},
    physics::{collider_handler::CollisionStats, physics_world::PhysicsWorld},
};

#[derive(Resource, Default)]
pub struct PhysicsResource {
    pub world: PhysicsWorld,
    pub entity_of_body: SecondaryMap<BodyHandle, Entity>,
    pub last_stats: CollisionStats,
}

impl PhysicsResource {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            world: PhysicsWorld::new(config),
            entity_of_body: SecondaryMap::new(),
            last_stats: CollisionStats::default(),
        }
    }

    /// Entity owning the body that `collider` is attached to.
    pub fn entity_of_collider(&self, collider: ColliderHandle) -> Option<Entity> {
        let body = self.world.collider(collider)?.body();
        self.entity_of_body.get(body).copied()
    }
}

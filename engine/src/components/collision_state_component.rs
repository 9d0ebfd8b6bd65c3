// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use bevy_ecs::{component::Component, entity::Entity};
use glam::Vec3;

/// Contacts of the entity's collider during the last physics step.
#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct CollisionStateComponent {
    pub has_collided: bool,
    /// Velocity change of the body exceeded the hard collision threshold.
    pub has_hard_collided: bool,
    /// Fastest approach speed of any contact this step.
    pub collision_velocity: f32,
    /// Partner entity and the contact normal pointing toward it.
    pub contacts: Vec<(Entity, Vec3)>,
}

impl CollisionStateComponent {
    pub fn touches(&self, entity: Entity) -> bool {
        self.contacts.iter().any(|(other, _)| *other == entity)
    }
}

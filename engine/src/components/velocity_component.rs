// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use bevy_ecs::component::Component;
use glam::Vec3;

/// World-space linear and angular velocity of a physics entity.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityComponent {
    pub translational: Vec3,
    pub angular: Vec3,
}

impl VelocityComponent {
    pub fn new(translational: Vec3, angular: Vec3) -> Self {
        Self {
            translational,
            angular,
        }
    }
}

// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use bevy_ecs::component::Component;

use crate::handles::BodyHandle;

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigidBodyComponent {
    pub body: BodyHandle,
}

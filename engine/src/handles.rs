// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use slotmap::new_key_type;

new_key_type! {
    /// A rigid body stored in a [`crate::RigidBodySet`].
    pub struct BodyHandle;
    /// A collider owned by the [`crate::ColliderHandler`].
    pub struct ColliderHandle;
}

// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

pub mod collider_component;
pub mod collision_state_component;
pub mod rigid_body_component;
pub mod transform_component;
pub mod velocity_component;

// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

pub mod aabb;
pub mod collider;
pub mod collider_handler;
pub mod dynamic_aabb_tree;
pub mod epa;
pub mod gjk;
pub mod impulse;
pub mod inertia;
pub mod manifold;
pub mod physics_resource;
pub mod physics_system;
pub mod physics_world;
pub mod rigid_body;
pub mod sat;
pub mod shape;

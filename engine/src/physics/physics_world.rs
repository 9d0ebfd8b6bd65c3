// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use crate::{
    config::PhysicsConfig,
    error::PhysicsError,
    gravity::Gravity,
    handles::{BodyHandle, ColliderHandle},
    physics::{
        collider::{Collider, ColliderDesc},
        collider_handler::{ColliderHandler, CollisionStats},
        rigid_body::{RigidBody, RigidBodyDesc, RigidBodySet},
    },
    utils::scope_timer::ScopeTimer,
};

/// Bodies, colliders and gravity stepped together.
pub struct PhysicsWorld {
    bodies: RigidBodySet,
    colliders: ColliderHandler,
    gravity: Gravity,
    config: PhysicsConfig,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            bodies: RigidBodySet::with_key(),
            colliders: ColliderHandler::new(config.clone()),
            gravity: Gravity::from(config.gravity),
            config,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn add_body(&mut self, desc: RigidBodyDesc) -> Result<BodyHandle, PhysicsError> {
        let body = RigidBody::new(desc)?;
        Ok(self.bodies.insert(body))
    }

    /// Removes the body along with every collider attached to it.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        let body = self.bodies.remove(handle)?;
        let removed = self.colliders.remove_body_colliders(handle);
        log::debug!("Removed body {handle:?} and {removed} collider(s)");
        Some(body)
    }

    pub fn add_collider(
        &mut self,
        body: BodyHandle,
        desc: ColliderDesc,
    ) -> Result<ColliderHandle, PhysicsError> {
        self.colliders.add(&mut self.bodies, body, desc)
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) -> Option<Collider> {
        self.colliders.remove(handle)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> &RigidBodySet {
        &self.bodies
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle)
    }

    pub fn colliders(&self) -> &ColliderHandler {
        &self.colliders
    }

    pub fn gravity(&self) -> Gravity {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Gravity) {
        self.gravity = gravity;
    }

    /// Integrates every dynamic body over `dt` seconds, then detects and
    /// resolves contacts. Invalid `dt` values skip the step.
    pub fn step(&mut self, dt: f32) -> CollisionStats {
        if !dt.is_finite() || dt <= 0.0 {
            log::warn!("Skipping physics step with invalid dt {dt}");
            return CollisionStats::default();
        }

        let gravity = self.gravity.gravity_vector();
        {
            let _timer = ScopeTimer::new("integration");
            for body in self.bodies.values_mut() {
                body.integrate(dt, gravity);
            }
        }

        self.colliders.resolve_collisions(&mut self.bodies)
    }
}

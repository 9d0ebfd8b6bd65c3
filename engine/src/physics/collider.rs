// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::{Quat, Vec3};

use crate::{
    error::PhysicsError,
    handles::{BodyHandle, ColliderHandle},
    physics::{
        aabb::Aabb,
        rigid_body::RigidBody,
        shape::{ColliderShape, Obb, transform_points},
    },
};

/// Surface response coefficients of a collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub static_friction: f32,
    pub kinetic_friction: f32,
    /// Restitution, conventionally in [0, 1].
    pub elasticity: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            static_friction: 0.7,
            kinetic_friction: 0.3,
            elasticity: 0.1,
        }
    }
}

impl Material {
    pub fn new(static_friction: f32, kinetic_friction: f32, elasticity: f32) -> Self {
        Self {
            static_friction,
            kinetic_friction,
            elasticity,
        }
    }

    /// Frictionless with the given elasticity.
    pub fn frictionless(elasticity: f32) -> Self {
        Self::new(0.0, 0.0, elasticity)
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        for (name, value) in [
            ("static_friction", self.static_friction),
            ("kinetic_friction", self.kinetic_friction),
            ("elasticity", self.elasticity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PhysicsError::InvalidMaterial { name, value });
            }
        }
        Ok(())
    }
}

/// Everything needed to attach a collider to a body.
#[derive(Debug, Clone, PartialEq)]
pub struct ColliderDesc {
    pub shape: ColliderShape,
    pub material: Material,
    /// Colliders sharing a group never collide with each other.
    pub group: Option<String>,
}

impl ColliderDesc {
    pub fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            material: Material::default(),
            group: None,
        }
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::new(ColliderShape::cuboid(half_extents))
    }

    pub fn convex_hull(points: Vec<Vec3>) -> Self {
        Self::new(ColliderShape::convex_hull(points))
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        self.shape.validate()?;
        self.material.validate()
    }
}

/// Body transform a collider's world cache was computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSnapshot {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

#[derive(Debug, Clone)]
pub struct Collider {
    body: BodyHandle,
    shape: ColliderShape,
    material: Material,
    group: Option<String>,

    has_collided: bool,
    has_hard_collided: bool,
    collision_velocity: f32,
    contacts: Vec<(ColliderHandle, Vec3)>,

    world_aabb: Aabb,
    surface_area: f32,
    world_points: Vec<Vec3>,
    snapshot: Option<TransformSnapshot>,
}

impl Collider {
    pub(crate) fn new(body: BodyHandle, desc: ColliderDesc) -> Result<Self, PhysicsError> {
        desc.validate()?;
        Ok(Self {
            body,
            shape: desc.shape,
            material: desc.material,
            group: desc.group,
            has_collided: false,
            has_hard_collided: false,
            collision_velocity: 0.0,
            contacts: Vec::new(),
            world_aabb: Aabb::default(),
            surface_area: 0.0,
            world_points: Vec::new(),
            snapshot: None,
        })
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn shape(&self) -> &ColliderShape {
        &self.shape
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn has_collided(&self) -> bool {
        self.has_collided
    }

    /// Whether the body's velocity changed by more than the solver's
    /// hard collision threshold while resolving this step's contacts.
    pub fn has_hard_collided(&self) -> bool {
        self.has_hard_collided
    }

    /// Fastest approach speed along a contact normal this step.
    pub fn collision_velocity(&self) -> f32 {
        self.collision_velocity
    }

    /// Partners touched this step with the contact normal pointing from
    /// this collider toward the partner.
    pub fn contacts(&self) -> &[(ColliderHandle, Vec3)] {
        &self.contacts
    }

    pub fn world_aabb(&self) -> Aabb {
        self.world_aabb
    }

    pub fn surface_area(&self) -> f32 {
        self.surface_area
    }

    pub fn world_points(&self) -> &[Vec3] {
        &self.world_points
    }

    /// Bounding box of the shape oriented with the body.
    pub fn world_obb(&self) -> Option<Obb> {
        let snapshot = self.snapshot?;
        Some(Obb::from_local_aabb(
            &self.shape.local_aabb(),
            snapshot.position,
            snapshot.rotation,
            snapshot.scale,
        ))
    }

    pub fn shares_group(&self, other: &Collider) -> bool {
        matches!((&self.group, &other.group), (Some(a), Some(b)) if a == b)
    }

    pub(crate) fn is_stale(&self, body: &RigidBody) -> bool {
        self.snapshot != Some(body.snapshot())
    }

    /// Rebuilds the world-space cache from the body transform and returns the
    /// new world AABB.
    pub(crate) fn refresh(&mut self, body: &RigidBody) -> Aabb {
        let transform = body.transform_matrix();
        self.world_points = transform_points(&self.shape.local_points(), &transform);
        self.world_aabb = Aabb::from_points(&self.world_points)
            .unwrap_or_else(|| Aabb::new(body.position, body.position));
        self.surface_area = self.world_aabb.surface_area();
        self.snapshot = Some(body.snapshot());
        self.world_aabb
    }

    pub(crate) fn reset_contacts(&mut self) {
        self.has_collided = false;
        self.has_hard_collided = false;
        self.collision_velocity = 0.0;
        self.contacts.clear();
    }

    pub(crate) fn record_contact(&mut self, partner: ColliderHandle, normal: Vec3) {
        self.has_collided = true;
        self.contacts.push((partner, normal));
    }

    pub(crate) fn record_impact(&mut self, speed: f32) {
        self.collision_velocity = self.collision_velocity.max(speed);
    }

    pub(crate) fn mark_hard_collided(&mut self) {
        self.has_hard_collided = true;
    }
}

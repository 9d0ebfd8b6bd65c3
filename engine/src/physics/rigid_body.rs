// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::{Mat3, Mat4, Quat, Vec3};
use slotmap::SlotMap;

use crate::{
    error::PhysicsError,
    handles::BodyHandle,
    physics::{
        collider::TransformSnapshot,
        inertia::{box_inertia, invert_inertia, world_inverse_inertia},
    },
};

pub type RigidBodySet = SlotMap<BodyHandle, RigidBody>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    /// Never moves; infinite mass.
    Static,
    #[default]
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodyDesc {
    pub body_type: BodyType,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl Default for RigidBodyDesc {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            mass: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }
}

impl RigidBodyDesc {
    pub fn dynamic(mass: f32) -> Self {
        Self {
            mass,
            ..Self::default()
        }
    }

    pub fn fixed() -> Self {
        Self {
            body_type: BodyType::Static,
            mass: 0.0,
            ..Self::default()
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, velocity: Vec3) -> Self {
        self.angular_velocity = velocity;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        let vectors = [
            ("position", self.position),
            ("scale", self.scale),
            ("linear_velocity", self.linear_velocity),
            ("angular_velocity", self.angular_velocity),
        ];
        if let Some((field, _)) = vectors.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PhysicsError::NonFiniteTransform { field: *field });
        }
        if !self.rotation.is_finite() || self.rotation.length_squared() <= f32::EPSILON {
            return Err(PhysicsError::NonFiniteTransform { field: "rotation" });
        }
        if self.scale.abs().min_element() <= f32::EPSILON {
            return Err(PhysicsError::NonFiniteTransform { field: "scale" });
        }
        if self.body_type == BodyType::Dynamic && (!self.mass.is_finite() || self.mass <= 0.0) {
            return Err(PhysicsError::InvalidMass(self.mass));
        }
        for (name, value) in [
            ("linear_damping", self.linear_damping),
            ("angular_damping", self.angular_damping),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PhysicsError::InvalidMaterial { name, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    /// Centre of mass in world space.
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub linear_velocity: Vec3,
    /// World-space angular velocity.
    pub angular_velocity: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,

    body_type: BodyType,
    mass: f32,
    inverse_mass: f32,
    local_inverse_inertia: Mat3,
    world_inverse_inertia: Mat3,
}

impl RigidBody {
    pub fn new(desc: RigidBodyDesc) -> Result<Self, PhysicsError> {
        desc.validate()?;

        let (mass, inverse_mass, local_inverse_inertia) = match desc.body_type {
            BodyType::Static => (0.0, 0.0, Mat3::ZERO),
            BodyType::Dynamic => {
                // Unit cube until a collider provides the real shape.
                let inertia = box_inertia(desc.mass, desc.scale.abs() * 2.0);
                (desc.mass, 1.0 / desc.mass, invert_inertia(&inertia))
            }
        };

        let mut body = Self {
            position: desc.position,
            rotation: desc.rotation.normalize(),
            scale: desc.scale,
            linear_velocity: desc.linear_velocity,
            angular_velocity: desc.angular_velocity,
            linear_damping: desc.linear_damping,
            angular_damping: desc.angular_damping,
            body_type: desc.body_type,
            mass,
            inverse_mass,
            local_inverse_inertia,
            world_inverse_inertia: Mat3::ZERO,
        };
        body.refresh_world_inertia();
        Ok(body)
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    pub fn local_inverse_inertia(&self) -> Mat3 {
        self.local_inverse_inertia
    }

    pub fn world_inverse_inertia(&self) -> Mat3 {
        self.world_inverse_inertia
    }

    pub(crate) fn set_local_inverse_inertia(&mut self, inverse: Mat3) {
        if self.is_dynamic() {
            self.local_inverse_inertia = inverse;
            self.refresh_world_inertia();
        }
    }

    pub fn transform_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub(crate) fn snapshot(&self) -> TransformSnapshot {
        TransformSnapshot {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    /// `R * I⁻¹ * Rᵀ` for the current orientation.
    pub fn refresh_world_inertia(&mut self) {
        let rotation = Mat3::from_quat(self.rotation);
        self.world_inverse_inertia = world_inverse_inertia(&rotation, &self.local_inverse_inertia);
    }

    /// Velocity of the material point at offset `r` from the centre of mass.
    pub fn velocity_at(&self, r: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// Applies `impulse` at offset `r` from the centre of mass.
    pub fn apply_impulse(&mut self, impulse: Vec3, r: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_velocity += impulse * self.inverse_mass;
        self.angular_velocity += self.world_inverse_inertia * r.cross(impulse);
    }

    /// Semi-implicit Euler step. Static bodies are left untouched.
    pub fn integrate(&mut self, dt: f32, gravity: Vec3) {
        if !self.is_dynamic() {
            return;
        }

        self.linear_velocity += gravity * dt;
        self.linear_velocity *= 1.0 / (1.0 + self.linear_damping * dt);
        self.angular_velocity *= 1.0 / (1.0 + self.angular_damping * dt);

        self.position += self.linear_velocity * dt;

        let w = self.angular_velocity;
        if w.length_squared() > 0.0 {
            let spin = Quat::from_xyzw(w.x, w.y, w.z, 0.0) * self.rotation;
            self.rotation = (self.rotation + spin * (0.5 * dt)).normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn integrate_applies_gravity_then_moves() {
        let mut body = RigidBody::new(
            RigidBodyDesc::dynamic(1.0).with_linear_velocity(Vec3::new(1.0, 0.0, 0.0)),
        )
        .expect("valid");
        body.integrate(1.0, Vec3::new(0.0, -9.81, 0.0));

        assert_relative_eq!(body.linear_velocity.y, -9.81, epsilon = 1e-6);
        assert_relative_eq!(body.position.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(body.position.y, -9.81, epsilon = 1e-6);
    }

    #[test]
    fn damping_slows_velocity() {
        let mut body = RigidBody::new(
            RigidBodyDesc::dynamic(2.0)
                .with_linear_velocity(Vec3::X * 2.0)
                .with_angular_velocity(Vec3::Y)
                .with_damping(1.0, 1.0),
        )
        .expect("valid");
        body.integrate(1.0, Vec3::ZERO);

        assert_relative_eq!(body.linear_velocity.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(body.angular_velocity.y, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn quaternion_step_matches_axis_angle() {
        let dt = 0.01;
        let mut body = RigidBody::new(RigidBodyDesc::dynamic(1.0).with_angular_velocity(Vec3::Z))
            .expect("valid");
        body.integrate(dt, Vec3::ZERO);

        let expected = Quat::from_axis_angle(Vec3::Z, dt);
        assert_approx_eq!(body.rotation.x, expected.x, 1e-5);
        assert_approx_eq!(body.rotation.y, expected.y, 1e-5);
        assert_approx_eq!(body.rotation.z, expected.z, 1e-5);
        assert_approx_eq!(body.rotation.w, expected.w, 1e-5);
        assert_approx_eq!(body.rotation.length(), 1.0, 1e-6);
    }

    #[test]
    fn static_body_never_moves() {
        let mut body = RigidBody::new(
            RigidBodyDesc::fixed().with_linear_velocity(Vec3::X),
        )
        .expect("valid");
        body.integrate(1.0, Vec3::new(0.0, -9.81, 0.0));
        body.apply_impulse(Vec3::Y * 10.0, Vec3::X);

        assert_eq!(body.position, Vec3::ZERO);
        assert_eq!(body.inverse_mass(), 0.0);
        assert_eq!(body.world_inverse_inertia(), Mat3::ZERO);
    }

    #[test]
    fn impulse_off_centre_spins_body() {
        let mut body = RigidBody::new(RigidBodyDesc::dynamic(1.0)).expect("valid");
        body.apply_impulse(Vec3::Y, Vec3::X);

        assert_relative_eq!(body.linear_velocity.y, 1.0, epsilon = 1e-6);
        // Unit cube of side 2: I = m/12 * 8 = 2/3, inverse 1.5.
        assert_relative_eq!(body.angular_velocity.z, 1.5, epsilon = 1e-5);
        assert_relative_eq!(body.velocity_at(Vec3::X).y, 2.5, epsilon = 1e-5);
    }

    #[test]
    fn world_inertia_follows_rotation() {
        let mut body = RigidBody::new(
            RigidBodyDesc::dynamic(1.0).with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
        )
        .expect("valid");
        body.set_local_inverse_inertia(Mat3::from_diagonal(Vec3::new(1.0, 2.0, 3.0)));
        let world = body.world_inverse_inertia();
        assert_relative_eq!(world.x_axis.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(world.y_axis.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn rejects_invalid_descriptions() {
        assert_eq!(
            RigidBody::new(RigidBodyDesc::dynamic(0.0)).err(),
            Some(PhysicsError::InvalidMass(0.0))
        );
        assert_eq!(
            RigidBody::new(RigidBodyDesc::dynamic(1.0).with_position(Vec3::splat(f32::NAN))).err(),
            Some(PhysicsError::NonFiniteTransform { field: "position" })
        );
        assert_eq!(
            RigidBody::new(RigidBodyDesc::dynamic(1.0).with_scale(Vec3::new(1.0, 0.0, 1.0))).err(),
            Some(PhysicsError::NonFiniteTransform { field: "scale" })
        );
        assert!(RigidBody::new(RigidBodyDesc::fixed()).is_ok());
    }
}

// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::Vec3;

/// Gravity as a direction and a magnitude. The world is Y-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    pub gravity_normal: Vec3,
    pub gravity_magnitude: f32,
}

impl Default for Gravity {
    fn default() -> Self {
        Self {
            gravity_normal: Vec3::NEG_Y,
            gravity_magnitude: 9.81,
        }
    }
}

impl From<Vec3> for Gravity {
    fn from(vector: Vec3) -> Self {
        let magnitude = vector.length();
        if magnitude <= f32::EPSILON || !magnitude.is_finite() {
            return Self::zero();
        }
        Self {
            gravity_normal: vector / magnitude,
            gravity_magnitude: magnitude,
        }
    }
}

impl From<[f32; 3]> for Gravity {
    fn from(vector: [f32; 3]) -> Self {
        Vec3::from_array(vector).into()
    }
}

impl Gravity {
    pub fn new(gravity_direction: Vec3, gravity_magnitude: f32) -> Self {
        Self {
            gravity_normal: gravity_direction.normalize_or(Vec3::NEG_Y),
            gravity_magnitude,
        }
    }

    /// No gravity; the direction is kept pointing down.
    pub fn zero() -> Self {
        Self {
            gravity_normal: Vec3::NEG_Y,
            gravity_magnitude: 0.0,
        }
    }

    pub fn gravity_vector(&self) -> Vec3 {
        self.gravity_normal * self.gravity_magnitude
    }

    pub fn up(&self) -> Vec3 {
        -self.gravity_normal
    }
}

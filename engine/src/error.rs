// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::Vec3;
use thiserror::Error;

/// Precondition violations rejected when bodies and colliders are created.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("convex hull needs at least {required} points, got {actual}")]
    TooFewPoints { required: usize, actual: usize },

    #[error("collider point {index} is not finite: {point}")]
    NonFinitePoint { index: usize, point: Vec3 },

    #[error("non-finite {field} in body transform")]
    NonFiniteTransform { field: &'static str },

    #[error("box half extents must be positive and finite, got {0}")]
    InvalidHalfExtents(Vec3),

    #[error("dynamic body mass must be positive and finite, got {0}")]
    InvalidMass(f32),

    #[error("material property {name} must be finite and non-negative, got {value}")]
    InvalidMaterial { name: &'static str, value: f32 },

    #[error("triangle {triangle} references point {index}, but the hull has {len} points")]
    TriangleIndexOutOfRange {
        triangle: usize,
        index: usize,
        len: usize,
    },

    #[error("collider points are degenerate (all points coincide)")]
    DegenerateShape,

    #[error("rigid body does not exist")]
    UnknownBody,

    #[error("collider does not exist")]
    UnknownCollider,
}

/// Contact generation failures. These are recoverable: the pair is reported
/// without contact points and no response is applied this step.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ManifoldError {
    #[error("clipping produced no contact points")]
    EmptyClip,

    #[error("contact normal is zero or not finite")]
    DegenerateNormal,
}

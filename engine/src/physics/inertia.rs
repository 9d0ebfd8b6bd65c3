// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::{Mat3, Vec3};

const VOLUME_EPSILON: f32 = 1e-9;

/// Mass properties of a closed triangle mesh with uniform density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshMassProperties {
    pub volume: f32,
    pub center_of_mass: Vec3,
    /// Inertia tensor about the mesh origin (not the centre of mass).
    pub inertia: Mat3,
}

fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Integrates volume, centre of mass and inertia tensor of a closed mesh of
/// the given total `mass`. Each triangle forms a signed tetrahedron with the
/// origin; the second moments of those tetrahedra sum to the covariance of
/// the solid.
///
/// Returns `None` for meshes that enclose no volume.
pub fn mesh_mass_properties(
    vertices: &[Vec3],
    triangles: &[[u32; 3]],
    mass: f32,
) -> Option<MeshMassProperties> {
    let mut volume = 0.0;
    let mut first_moment = Vec3::ZERO;
    let mut covariance = Mat3::ZERO;

    for [i0, i1, i2] in triangles {
        let a = *vertices.get(*i0 as usize)?;
        let b = *vertices.get(*i1 as usize)?;
        let c = *vertices.get(*i2 as usize)?;

        let det = a.dot(b.cross(c));
        let tet_volume = det / 6.0;
        let sum = a + b + c;

        volume += tet_volume;
        first_moment += sum * (tet_volume / 4.0);
        covariance += (outer(a, a) + outer(b, b) + outer(c, c) + outer(sum, sum)) * (det / 120.0);
    }

    // Inward winding flips every sign.
    if volume < 0.0 {
        volume = -volume;
        first_moment = -first_moment;
        covariance = -covariance;
    }
    if volume <= VOLUME_EPSILON {
        return None;
    }

    let density = mass / volume;
    let covariance = covariance * density;
    let inertia = Mat3::from_diagonal(Vec3::splat(trace(&covariance))) - covariance;

    Some(MeshMassProperties {
        volume,
        center_of_mass: first_moment / volume,
        inertia,
    })
}

fn trace(m: &Mat3) -> f32 {
    m.x_axis.x + m.y_axis.y + m.z_axis.z
}

/// Inertia of a solid box with the given full side lengths.
pub fn box_inertia(mass: f32, size: Vec3) -> Mat3 {
    let sq = size * size;
    Mat3::from_diagonal(Vec3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) * (mass / 12.0))
}

/// Inverts an inertia tensor. Singular tensors invert to zero, meaning the
/// body does not rotate about that axis.
pub fn invert_inertia(inertia: &Mat3) -> Mat3 {
    let det = inertia.determinant();
    if det.abs() <= f32::EPSILON || !det.is_finite() {
        return Mat3::ZERO;
    }
    inertia.inverse()
}

/// Rotates a body-aligned inverse inertia tensor into world space: `R * I⁻¹ * Rᵀ`.
pub fn world_inverse_inertia(rotation: &Mat3, local_inverse: &Mat3) -> Mat3 {
    *rotation * *local_inverse * rotation.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::shape::box_mesh;
    use approx::assert_relative_eq;
    use glam::Quat;

    fn assert_mat3_eq(a: &Mat3, b: &Mat3, epsilon: f32) {
        for (x, y) in a.to_cols_array().iter().zip(b.to_cols_array().iter()) {
            assert_relative_eq!(*x, *y, epsilon = epsilon);
        }
    }

    #[test]
    fn box_mesh_matches_closed_form() {
        let half = Vec3::new(1.0, 2.0, 0.5);
        let (vertices, triangles) = box_mesh(half);
        let props = mesh_mass_properties(&vertices, &triangles, 3.0).expect("closed mesh");

        assert_relative_eq!(props.volume, 8.0 * half.x * half.y * half.z, epsilon = 1e-4);
        assert_relative_eq!(props.center_of_mass.length(), 0.0, epsilon = 1e-5);
        assert_mat3_eq(&props.inertia, &box_inertia(3.0, half * 2.0), 1e-4);
    }

    #[test]
    fn unit_cube_inertia() {
        let (vertices, triangles) = box_mesh(Vec3::ONE);
        let props = mesh_mass_properties(&vertices, &triangles, 1.0).expect("closed mesh");
        // m/12 * (2^2 + 2^2)
        assert_relative_eq!(props.inertia.x_axis.x, 2.0 / 3.0, epsilon = 1e-5);
        assert_relative_eq!(props.inertia.y_axis.y, 2.0 / 3.0, epsilon = 1e-5);
        assert_relative_eq!(props.inertia.z_axis.z, 2.0 / 3.0, epsilon = 1e-5);
        assert_relative_eq!(props.inertia.x_axis.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn reversed_winding_gives_same_result() {
        let (vertices, triangles) = box_mesh(Vec3::ONE);
        let reversed: Vec<[u32; 3]> = triangles.iter().map(|[a, b, c]| [*a, *c, *b]).collect();
        let a = mesh_mass_properties(&vertices, &triangles, 2.0).expect("closed");
        let b = mesh_mass_properties(&vertices, &reversed, 2.0).expect("closed");
        assert_relative_eq!(a.volume, b.volume, epsilon = 1e-5);
        assert_mat3_eq(&a.inertia, &b.inertia, 1e-5);
    }

    #[test]
    fn offset_mesh_includes_parallel_axis_term() {
        let (vertices, triangles) = box_mesh(Vec3::ONE);
        let shifted: Vec<Vec3> = vertices.iter().map(|v| *v + Vec3::X * 3.0).collect();
        let props = mesh_mass_properties(&shifted, &triangles, 1.0).expect("closed");

        assert_relative_eq!(props.center_of_mass.x, 3.0, epsilon = 1e-4);
        assert_relative_eq!(props.inertia.x_axis.x, 2.0 / 3.0, epsilon = 1e-4);
        assert_relative_eq!(props.inertia.y_axis.y, 2.0 / 3.0 + 9.0, epsilon = 1e-3);
    }

    #[test]
    fn open_mesh_has_no_volume() {
        let vertices = [Vec3::ZERO, Vec3::X, Vec3::Y];
        assert!(mesh_mass_properties(&vertices, &[[0, 1, 2]], 1.0).is_none());
    }

    #[test]
    fn world_inverse_inertia_rotates_axes() {
        let local = Mat3::from_diagonal(Vec3::new(1.0, 2.0, 3.0));
        let rotation = Mat3::from_quat(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        let world = world_inverse_inertia(&rotation, &local);
        // Local x maps to world y, so the world y diagonal takes the local x value.
        assert_relative_eq!(world.x_axis.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(world.y_axis.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(world.z_axis.z, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn singular_inertia_inverts_to_zero() {
        assert_eq!(invert_inertia(&Mat3::ZERO), Mat3::ZERO);
    }
}

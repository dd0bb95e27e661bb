//! Plane and reflection math shared by the portal renderer and the teleport
//! engine.

use bevy::{math::Vec4Swizzles, prelude::*};

/// Extended sign: returns -1, 0 or 1.
pub fn sgn(a: f32) -> f32 {
    if a > 0. {
        1.
    } else if a < 0. {
        -1.
    } else {
        0.
    }
}

/// Homogeneous plane through `pos` with the given normal, as `(n, d)` with
/// `n.dot(x) + d == 0` for points `x` on the plane.
pub fn plane_from_point_normal(pos: Vec3, normal: Vec3) -> Vec4 {
    Vec4::from((normal, -normal.dot(pos)))
}

/// Given position/normal of a world-space plane, calculates the plane in the
/// space of a camera with world-to-camera matrix `view`. `side_sign` picks
/// which half-space the normal faces. Returns `None` for a degenerate
/// normal.
pub fn camera_space_plane(view: Mat4, pos: Vec3, normal: Vec3, side_sign: f32) -> Option<Vec4> {
    let cpos = view.transform_point3(pos);
    let cnormal = view.transform_vector3(normal).try_normalize()? * side_sign;
    Some(Vec4::from((cnormal, -cpos.dot(cnormal))))
}

/// Householder reflection across a homogeneous plane `(n, d)`, `n` unit
/// length. The matrix is an involution: applying it twice is the identity.
pub fn reflection_matrix(plane: Vec4) -> Mat4 {
    let n = plane.xyz();
    let d = plane.w;
    Mat4::from_cols(
        Vec4::new(
            1. - 2. * n.x * n.x,
            -2. * n.y * n.x,
            -2. * n.z * n.x,
            0.,
        ),
        Vec4::new(
            -2. * n.x * n.y,
            1. - 2. * n.y * n.y,
            -2. * n.z * n.y,
            0.,
        ),
        Vec4::new(
            -2. * n.x * n.z,
            -2. * n.y * n.z,
            1. - 2. * n.z * n.z,
            0.,
        ),
        Vec4::new(-2. * d * n.x, -2. * d * n.y, -2. * d * n.z, 1.),
    )
}

/// Reflects `v` across the plane with unit normal `n`.
pub fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2. * v.dot(n) * n
}

/// Rotation looking along `forward` with the given up hint, or `None` when
/// the inputs are degenerate (zero-length or collinear).
pub fn look_rotation(forward: Vec3, up: Vec3) -> Option<Quat> {
    let back = (-forward).try_normalize()?;
    let right = up.cross(back).try_normalize()?;
    let up = back.cross(right);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, back)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec3_near(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a} != {b}");
    }

    #[test]
    fn sgn_is_the_extended_sign() {
        assert_eq!(sgn(3.5), 1.);
        assert_eq!(sgn(-0.01), -1.);
        assert_eq!(sgn(0.), 0.);
    }

    #[test]
    fn camera_space_plane_identity_view() {
        let plane =
            camera_space_plane(Mat4::IDENTITY, Vec3::new(0., 0., -5.), Vec3::Z, 1.).unwrap();
        assert!((plane - Vec4::new(0., 0., 1., 5.)).length() < 1e-5);
    }

    #[test]
    fn camera_space_plane_rejects_degenerate_normal() {
        assert!(camera_space_plane(Mat4::IDENTITY, Vec3::ONE, Vec3::ZERO, 1.).is_none());
    }

    #[test]
    fn reflection_maps_points_across_the_plane() {
        // Plane y = 2.
        let m = reflection_matrix(plane_from_point_normal(Vec3::new(0., 2., 0.), Vec3::Y));
        assert_vec3_near(m.transform_point3(Vec3::new(1., 5., -3.)), Vec3::new(1., -1., -3.));
        // Points on the plane are fixed.
        assert_vec3_near(m.transform_point3(Vec3::new(7., 2., 1.)), Vec3::new(7., 2., 1.));
    }

    #[test]
    fn reflection_is_an_involution() {
        let n = Vec3::new(1., 2., -0.5).normalize();
        let m = reflection_matrix(plane_from_point_normal(Vec3::new(0.3, -1., 2.), n));
        let p = Vec3::new(-4., 2.5, 9.);
        assert_vec3_near(m.transform_point3(m.transform_point3(p)), p);
    }

    #[test]
    fn reflect_flips_normal_component_only() {
        let n = Vec3::new(0., 0., 1.);
        let v = Vec3::new(1.5, -2., 4.);
        let r = reflect(v, n);
        assert!((r.dot(n) + v.dot(n)).abs() < 1e-5);
        assert_vec3_near(Vec3::new(r.x, r.y, 0.), Vec3::new(v.x, v.y, 0.));
    }

    #[test]
    fn look_rotation_points_forward() {
        let dir = Vec3::new(1., 0., -1.).normalize();
        let rot = look_rotation(dir, Vec3::Y).unwrap();
        assert_vec3_near(rot * Vec3::NEG_Z, dir);
        assert!(look_rotation(Vec3::ZERO, Vec3::Y).is_none());
        assert!(look_rotation(Vec3::Y, Vec3::Y).is_none());
    }
}

use std::f32::consts::FRAC_PI_4;

use bevy::{prelude::*, render::camera::CameraProjection};

/// Camera projection which allows for an oblique near clipping plane, used for rendering portal
/// virtual cameras.
///
/// Two extras on top of a plain perspective matrix:
/// * `clip_plane` is the portal clip plane expressed in the remapped view
///   space; when unset the projection falls back to the plain perspective
///   matrix, so a degenerate plane just loses the clip, not the frame.
/// * `view_correction` maps the camera rig's transform-derived view space to
///   the exact remapped view space. The rig transform can only carry a rigid
///   pose, while a mirror portal's view contains a reflection; folding the
///   difference into the projection keeps the rendered image faithful.
#[derive(Debug, Component, Clone, Reflect)]
#[reflect(Component)]
pub struct PortalCameraProjection {
    pub fov: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
    #[reflect(ignore)]
    pub clip_plane: Option<Vec4>,
    #[reflect(ignore)]
    pub view_correction: Mat4,
}

impl Default for PortalCameraProjection {
    fn default() -> Self {
        PortalCameraProjection {
            fov: FRAC_PI_4,
            aspect_ratio: 16. / 9.,
            near: 0.1,
            far: 1000.,
            clip_plane: None,
            view_correction: Mat4::IDENTITY,
        }
    }
}

impl CameraProjection for PortalCameraProjection {
    fn get_projection_matrix(&self) -> Mat4 {
        // Math taken from https://www.terathon.com/lengyel/Lengyel-Oblique.pdf
        let proj_mat = Mat4::perspective_infinite_rh(self.fov, self.aspect_ratio, self.near);
        let mut oblique_proj_mat = proj_mat;

        if let Some(c) = self.clip_plane {
            let proj_mat_inv = proj_mat.inverse();
            let m4 = proj_mat.row(3);
            let qp = Vec4::new(c.x.signum(), c.y.signum(), 1., 1.);
            let q = proj_mat_inv * qp;
            let denom = c.dot(q);
            if denom.abs() > f32::EPSILON {
                let a = m4.dot(q) / denom;
                let new_m3 = a * c;
                oblique_proj_mat.x_axis.z = new_m3.x;
                oblique_proj_mat.y_axis.z = new_m3.y;
                oblique_proj_mat.z_axis.z = new_m3.z;
                oblique_proj_mat.w_axis.z = new_m3.w;
            }
        }

        oblique_proj_mat * self.view_correction
    }

    fn update(&mut self, _width: f32, _height: f32) {
        // Framing must match the viewer camera, not the square render
        // target, so the aspect ratio is synced from the viewer instead of
        // the target surface.
    }

    fn far(&self) -> f32 {
        self.far
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_clip_plane_is_plain_perspective() {
        let proj = PortalCameraProjection {
            fov: FRAC_PI_4,
            aspect_ratio: 1.,
            near: 0.1,
            far: 1000.,
            clip_plane: None,
            view_correction: Mat4::IDENTITY,
        };
        let expected = Mat4::perspective_infinite_rh(FRAC_PI_4, 1., 0.1);
        assert!((proj.get_projection_matrix() - expected).abs_diff_eq(Mat4::ZERO, 1e-6));
    }

    #[test]
    fn points_on_the_clip_plane_map_to_the_near_plane() {
        // Camera-space plane at z = -3, facing the camera.
        let plane = Vec4::new(0., 0., 1., 3.);
        let proj = PortalCameraProjection {
            fov: FRAC_PI_4,
            aspect_ratio: 1.,
            near: 0.1,
            far: 1000.,
            clip_plane: Some(plane),
            view_correction: Mat4::IDENTITY,
        };
        let m = proj.get_projection_matrix();
        for p in [
            Vec3::new(0., 0., -3.),
            Vec3::new(0.4, -0.2, -3.),
            Vec3::new(-0.8, 0.5, -3.),
        ] {
            let clip = m * Vec4::from((p, 1.));
            assert!(clip.w > 0.);
            assert!(
                (clip.z / clip.w).abs() < 1e-4,
                "point on plane not at near: {clip:?}"
            );
        }
        // A point between the camera and the plane sits on the clipped side.
        let clipped = m * Vec4::new(0., 0., -1., 1.);
        assert!(clipped.z / clipped.w < 0.);
        // A point beyond the plane renders.
        let kept = m * Vec4::new(0., 0., -10., 1.);
        assert!(kept.z / kept.w > 0.);
    }

    #[test]
    fn view_correction_multiplies_on_the_right() {
        let correction = Mat4::from_translation(Vec3::new(1., 2., 3.));
        let proj = PortalCameraProjection {
            clip_plane: None,
            view_correction: correction,
            aspect_ratio: 1.,
            ..default()
        };
        let expected = Mat4::perspective_infinite_rh(FRAC_PI_4, 1., 0.1) * correction;
        assert!((proj.get_projection_matrix() - expected).abs_diff_eq(Mat4::ZERO, 1e-6));
    }
}

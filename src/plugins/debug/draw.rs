use bevy::{math::Vec4Swizzles, prelude::*};
use bevy_prototype_debug_lines::DebugLines;

const NEAR_COLOR: Color = Color::BLACK;
const FAR_COLOR: Color = Color::WHITE;
// Keep the far corners finite under an infinite projection.
const FAR_NDC: f32 = 0.999;

/// Draws the frustum wireframe for an inverse view-projection matrix.
pub fn draw_camera_frustum(inv_view_projection: Mat4, lines: &mut ResMut<DebugLines>) {
    let corners = [
        Vec4::new(-1., -1., 0., 1.),
        Vec4::new(1., -1., 0., 1.),
        Vec4::new(-1., 1., 0., 1.),
        Vec4::new(1., 1., 0., 1.),
        Vec4::new(-1., -1., FAR_NDC, 1.),
        Vec4::new(1., -1., FAR_NDC, 1.),
        Vec4::new(-1., 1., FAR_NDC, 1.),
        Vec4::new(1., 1., FAR_NDC, 1.),
    ]
    .into_iter()
    .map(|v| {
        let vh = inv_view_projection * v;
        vh.xyz() / vh.w
    })
    .collect::<Vec<_>>();

    // Depth lines
    lines.line_gradient(corners[0], corners[4], 0., NEAR_COLOR, FAR_COLOR);
    lines.line_gradient(corners[1], corners[5], 0., NEAR_COLOR, FAR_COLOR);
    lines.line_gradient(corners[2], corners[6], 0., NEAR_COLOR, FAR_COLOR);
    lines.line_gradient(corners[3], corners[7], 0., NEAR_COLOR, FAR_COLOR);

    // Near plane
    lines.line_colored(corners[0], corners[1], 0., NEAR_COLOR);
    lines.line_colored(corners[0], corners[2], 0., NEAR_COLOR);
    lines.line_colored(corners[1], corners[3], 0., NEAR_COLOR);
    lines.line_colored(corners[2], corners[3], 0., NEAR_COLOR);

    // Far plane
    lines.line_colored(corners[4], corners[5], 0., FAR_COLOR);
    lines.line_colored(corners[4], corners[6], 0., FAR_COLOR);
    lines.line_colored(corners[5], corners[7], 0., FAR_COLOR);
    lines.line_colored(corners[6], corners[7], 0., FAR_COLOR);
}

/// Portal basis: forward in red, up in green, right in blue.
pub fn draw_portal_frame(trf: &Transform, lines: &mut ResMut<DebugLines>) {
    let origin = trf.translation;
    lines.line_colored(origin, origin + trf.forward(), 0., Color::RED);
    lines.line_colored(origin, origin + trf.up(), 0., Color::GREEN);
    lines.line_colored(origin, origin + trf.right(), 0., Color::BLUE);
}

/// Horizontal ring, used for spherical exit thresholds.
pub fn draw_ring(center: Vec3, radius: f32, lines: &mut ResMut<DebugLines>) {
    const SEGMENTS: usize = 24;
    for i in 0..SEGMENTS {
        let a = i as f32 / SEGMENTS as f32 * std::f32::consts::TAU;
        let b = (i + 1) as f32 / SEGMENTS as f32 * std::f32::consts::TAU;
        lines.line_colored(
            center + Vec3::new(a.cos(), 0., a.sin()) * radius,
            center + Vec3::new(b.cos(), 0., b.sin()) * radius,
            0.,
            Color::YELLOW,
        );
    }
}

#![allow(dead_code)]

pub mod draw;

use bevy::{app::PluginGroupBuilder, prelude::*};

use crate::plugins::portal::{
    sphere_teleport::SphereTeleporter, Portal, PortalCameraProjection, PortalViewCamera,
};

#[derive(Debug)]
/// Development plugins intended for debug builds use.
pub struct DeveloperPlugins;

impl PluginGroup for DeveloperPlugins {
    fn build(self) -> PluginGroupBuilder {
        let group = PluginGroupBuilder::start::<Self>()
            .add(bevy_prototype_debug_lines::DebugLinesPlugin::default())
            .add(PortalDebugPlugin);
        #[cfg(feature = "editor")]
        let group = group
            .add(bevy_editor_pls::prelude::EditorPlugin)
            .add(bevy_inspector_egui_rapier::InspectableRapierPlugin);
        group
    }
}

#[derive(Debug)]
/// Debug-line overlays for portal frames and view camera frusta.
pub struct PortalDebugPlugin;

impl Plugin for PortalDebugPlugin {
    fn build(&self, app: &mut App) {
        app.add_system(draw_portal_frames)
            .add_system(draw_portal_camera_frusta);
    }
}

fn draw_portal_frames(
    portals: Query<(&GlobalTransform, &Portal, Option<&SphereTeleporter>)>,
    mut lines: ResMut<bevy_prototype_debug_lines::DebugLines>,
) {
    for (gtrf, portal, sphere) in &portals {
        if !portal.enabled {
            continue;
        }
        let trf = gtrf.compute_transform();
        draw::draw_portal_frame(&trf, &mut lines);
        if let Some(sphere) = sphere {
            let radius = crate::plugins::portal::sphere_teleport::exit_threshold(
                trf.scale,
                sphere.collider_radius,
            );
            draw::draw_ring(trf.translation, radius, &mut lines);
        }
    }
}

fn draw_portal_camera_frusta(
    cameras: Query<(&GlobalTransform, &PortalCameraProjection), With<PortalViewCamera>>,
    mut lines: ResMut<bevy_prototype_debug_lines::DebugLines>,
) {
    use bevy::render::camera::CameraProjection;

    for (gtrf, projection) in &cameras {
        let view_projection = projection.get_projection_matrix() * gtrf.compute_matrix().inverse();
        draw::draw_camera_frustum(view_projection.inverse(), &mut lines);
    }
}

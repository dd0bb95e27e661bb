//! Portal rendering and teleportation.
//!
//! A portal pair renders each other's view through per-viewer secondary
//! cameras with an oblique near clip plane, and teleports bodies crossing
//! the surface through the teleport engines in [`teleport`] and
//! [`sphere_teleport`].

use std::sync::atomic::{AtomicBool, Ordering};

use bevy::{
    prelude::*,
    reflect::FromReflect,
    render::{
        camera::{CameraProjectionPlugin, RenderTarget},
        render_resource::{
            Extent3d, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
        },
        view::RenderLayers,
    },
    transform::TransformSystem,
    utils::HashMap,
};
use iyes_loopless::prelude::*;
use serde::Deserialize;

mod camera_projection;
pub mod dimension;
pub mod geometry;
mod material;
pub mod sphere_teleport;
pub mod spawn;
pub mod teleport;
pub mod waver;

pub use camera_projection::PortalCameraProjection;
pub use material::PortalMaterial;

use crate::plugins::physics::SIM_STEP;

/// Render layer carrying the portal surfaces themselves. Viewer cameras get
/// this layer added so the surfaces show up in the main view.
pub const PORTAL_SURFACE_LAYER: u8 = 1;
/// Reserved layer that portal view cameras never render.
pub const NO_PORTAL_RENDER_LAYER: u8 = 4;
/// Layer for dynamic lights that portals can suppress while rendering.
pub const DYNAMIC_LIGHTS_LAYER: u8 = 5;

/// Margin keeping the spherical clip plane from cutting in front of the
/// computed camera position.
const SPHERE_CLIP_MARGIN: f32 = 0.7;

#[derive(Debug)]
pub struct PortalPlugin;

// TODO: recursive portal-in-portal views need a camera pool per iteration
// depth instead of the single guarded camera per viewer.

#[derive(Debug, SystemLabel)]
pub enum PortalLabels {
    RegisterViewers,
    OpenPortals,
    CreateCameras,
    SyncCameras,
    TrackMembership,
    TeleportEntities,
}

/// Tunables for spawned portal pairs, optionally overridden from
/// `assets/portal_settings.json`.
#[derive(Debug, Clone, Resource, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    /// Square render target edge, in pixels.
    pub texture_size: u32,
    /// Clip plane offset for spherical portals.
    pub clip_radius: f32,
    /// Keep dynamic lights out of portal views.
    pub disable_pixel_lights: bool,
    /// Spawn mirror pairs instead of plain ones.
    pub mirror: bool,
    /// Spawn spherical pairs instead of planar ones.
    pub spherical: bool,
    /// Names that never teleport.
    pub no_teleport: Vec<String>,
    /// Vertical distance between the two world layers.
    pub dimension_offset: f32,
    /// How far in front of the player pairs open.
    pub spawn_range: f32,
}

impl Default for PortalSettings {
    fn default() -> Self {
        PortalSettings {
            texture_size: 1080,
            clip_radius: 2.,
            disable_pixel_lights: true,
            mirror: false,
            spherical: false,
            no_teleport: vec!["Ground".into(), "Wall".into(), "Ceiling".into()],
            dimension_offset: 40.,
            spawn_range: 2.5,
        }
    }
}

const SETTINGS_PATH: &str = "assets/portal_settings.json";

fn load_portal_settings(mut commands: Commands) {
    match std::fs::read_to_string(SETTINGS_PATH) {
        Ok(text) => match serde_json::from_str::<PortalSettings>(&text) {
            Ok(settings) => {
                info!("Loaded portal settings from {}", SETTINGS_PATH);
                commands.insert_resource(settings);
            }
            Err(e) => warn!("Ignoring malformed {}: {}", SETTINGS_PATH, e),
        },
        Err(_) => debug!("No {}, using default portal settings", SETTINGS_PATH),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect, FromReflect)]
pub enum PortalShape {
    #[default]
    Planar,
    Spherical {
        clip_radius: f32,
    },
}

/// One member of a linked portal pair.
#[derive(Debug, Component, Reflect)]
#[reflect(Component)]
pub struct Portal {
    /// The paired portal. A back-reference, not owned: despawning the
    /// partner nulls this instead of dangling.
    pub linked: Option<Entity>,
    pub shape: PortalShape,
    /// Render from the opposite side of the partner, like a mirror.
    pub mirror: bool,
    pub enabled: bool,
    pub disable_pixel_lights: bool,
    /// Square render target edge. Changing it rebuilds the target.
    pub texture_size: u32,
    /// Layers this portal's view cameras may render.
    pub render_layers: RenderLayers,
}

impl Default for Portal {
    fn default() -> Self {
        Portal {
            linked: None,
            shape: PortalShape::Planar,
            mirror: false,
            enabled: true,
            disable_pixel_lights: true,
            texture_size: 1080,
            render_layers: RenderLayers::all(),
        }
    }
}

/// Marker on the secondary cameras rendering portal views.
#[derive(Debug, Component)]
pub struct PortalViewCamera {
    pub portal: Entity,
    pub viewer: Entity,
}

/// Reentrancy guard for portal view computation. A portal visible through
/// another portal must not re-enter the routine and recurse without bound.
///
/// Acquired through an RAII handle so release happens on every path.
#[derive(Debug, Default, Resource)]
pub struct RenderGuard(AtomicBool);

impl RenderGuard {
    pub fn try_acquire(&self) -> Option<RenderPass<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RenderPass(&self.0))
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct RenderPass<'a>(&'a AtomicBool);

impl Drop for RenderPass<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
struct PortalTarget {
    image: Handle<Image>,
    size: u32,
}

/// Associative storage for the per-(portal, viewer) secondary cameras and
/// the per-portal render targets. Kept out of the components so release is
/// deterministic even after a portal entity is gone.
#[derive(Debug, Default, Resource)]
pub struct PortalCameraArena {
    cameras: HashMap<(Entity, Entity), Entity>,
    targets: HashMap<Entity, PortalTarget>,
}

/// Secondary camera pose and clip plane for one (portal, viewer) pair.
#[derive(Debug, Clone)]
pub struct PortalViewPose {
    pub translation: Vec3,
    /// Viewer yaw and pitch, roll discarded to keep the image upright.
    pub rotation: Quat,
    /// The exact remapped world-to-camera matrix, including the mirror
    /// reflection when applicable.
    pub view_matrix: Mat4,
    pub clip_pos: Vec3,
    pub clip_normal: Vec3,
}

/// Computes the secondary camera pose for `viewer` looking through `portal`
/// onto its partner. Returns `None` for degenerate geometry.
pub fn portal_view_pose(
    shape: PortalShape,
    mirror: bool,
    portal_trf: &Transform,
    partner_trf: &Transform,
    viewer_trf: &Transform,
) -> Option<PortalViewPose> {
    let portal_pos = portal_trf.translation;
    let partner_pos = partner_trf.translation;

    // The viewer's position in the portal's local frame, mapped into the
    // partner's world frame, is where the secondary camera sits.
    let mut local_pos = portal_trf
        .compute_matrix()
        .inverse()
        .transform_point3(viewer_trf.translation);
    if mirror {
        local_pos = -local_pos;
    }
    let partner_cam_pos = partner_trf.compute_matrix().transform_point3(local_pos);

    let (clip_normal, clip_pos) = match shape {
        PortalShape::Planar => {
            let fwd = portal_trf.forward();
            // Clip against the portal plane, sided so the rendered
            // half-space is the one the viewer looks into.
            let normal = if local_pos.z > 0. { fwd } else { -fwd };
            (normal, partner_pos)
        }
        PortalShape::Spherical { clip_radius } => {
            let mut normal = viewer_trf.forward();
            if mirror {
                normal = -normal;
            }
            let mut clip_pos = partner_pos - normal * clip_radius;
            // Pull the plane in when it would clip nearer than the camera
            // itself, which pops the near geometry out of the view.
            if partner_pos.distance(clip_pos) + SPHERE_CLIP_MARGIN
                >= partner_pos.distance(partner_cam_pos)
            {
                clip_pos = partner_cam_pos + normal * SPHERE_CLIP_MARGIN;
            }
            (normal, clip_pos)
        }
    };
    if !clip_normal.is_finite() || clip_normal.length_squared() < 1e-8 {
        return None;
    }

    let viewer_view = viewer_trf.compute_matrix().inverse();
    let offset_inv = Mat4::from_translation(partner_pos - portal_pos).inverse();
    let view_matrix = if mirror {
        let reflection = geometry::reflection_matrix(geometry::plane_from_point_normal(
            partner_pos,
            clip_normal,
        ));
        viewer_view * offset_inv * reflection
    } else {
        viewer_view * offset_inv
    };

    let (yaw, pitch, _roll) = viewer_trf.rotation.to_euler(EulerRot::YXZ);
    let rotation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.);

    Some(PortalViewPose {
        translation: partner_cam_pos,
        rotation,
        view_matrix,
        clip_pos,
        clip_normal,
    })
}

/// [`portal_view_pose`] behind the recursion guard: while a pass is held
/// the call is a no-op, so a nested render submission cannot recurse.
pub fn guarded_portal_view(
    guard: &RenderGuard,
    shape: PortalShape,
    mirror: bool,
    portal_trf: &Transform,
    partner_trf: &Transform,
    viewer_trf: &Transform,
) -> Option<PortalViewPose> {
    let _pass = guard.try_acquire()?;
    portal_view_pose(shape, mirror, portal_trf, partner_trf, viewer_trf)
}

impl Plugin for PortalPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(MaterialPlugin::<PortalMaterial>::default())
            .add_plugin(CameraProjectionPlugin::<PortalCameraProjection>::default())
            .register_type::<Portal>()
            .register_type::<PortalCameraProjection>()
            .init_resource::<PortalSettings>()
            .init_resource::<RenderGuard>()
            .init_resource::<PortalCameraArena>()
            .init_resource::<spawn::ActivePortalPair>()
            .add_event::<spawn::OpenPortalPair>()
            .add_event::<spawn::ClosePortalPair>()
            .add_startup_system_to_stage(StartupStage::PreStartup, load_portal_settings)
            .add_startup_system(spawn::load_portal_assets)
            .add_system(register_viewer_cameras.label(PortalLabels::RegisterViewers))
            .add_system_set(
                SystemSet::new()
                    .label(PortalLabels::OpenPortals)
                    .with_system(spawn::open_portal_pairs)
                    .with_system(spawn::close_portal_pairs),
            )
            .add_system(unlink_dead_partners.after(PortalLabels::OpenPortals))
            .add_system(
                create_portal_cameras
                    .label(PortalLabels::CreateCameras)
                    .after(PortalLabels::OpenPortals)
                    .after(PortalLabels::RegisterViewers),
            )
            .add_system(
                sync_portal_cameras
                    .label(PortalLabels::SyncCameras)
                    .after(PortalLabels::CreateCameras),
            )
            .add_system(apply_portal_textures.after(PortalLabels::CreateCameras))
            .add_system(release_portal_cameras.after(PortalLabels::SyncCameras))
            .add_system(waver::animate_wavers)
            .add_system(dimension::follow_dimension_twins)
            .add_system(teleport::track_trigger_membership.label(PortalLabels::TrackMembership))
            .add_system(teleport::relax_wall_collisions)
            .add_system(teleport::unlink_dead_teleporters)
            .add_system(
                sphere_teleport::track_sphere_membership.label(PortalLabels::TrackMembership),
            )
            .add_system(sphere_teleport::unlink_dead_sphere_teleporters)
            .add_fixed_timestep_system(
                SIM_STEP,
                0,
                teleport::teleport_crossed_objects.label(PortalLabels::TeleportEntities),
            )
            .add_fixed_timestep_system(SIM_STEP, 0, sphere_teleport::step_sphere_portals)
            .add_system_to_stage(
                CoreStage::PostUpdate,
                bevy::render::view::update_frusta::<PortalCameraProjection>
                    .after(TransformSystem::TransformPropagate),
            );
    }
}

/// Add the portal surface layer to window-targeted cameras so they can see
/// portal surfaces.
fn register_viewer_cameras(
    mut commands: Commands,
    cameras: Query<(Entity, &Camera), (Without<PortalViewCamera>, Without<RenderLayers>)>,
) {
    for (entity, camera) in &cameras {
        if let RenderTarget::Window(_) = camera.target {
            // Viewers see portal surfaces and the dynamic lights that
            // portal cameras may suppress.
            commands.entity(entity).insert(
                RenderLayers::default()
                    .with(PORTAL_SURFACE_LAYER)
                    .with(DYNAMIC_LIGHTS_LAYER),
            );
            info!("Registered viewer camera {:?} for portal rendering", entity);
        }
    }
}

/// Null partner references pointing at despawned portals.
fn unlink_dead_partners(mut portals: Query<(Entity, &mut Portal)>) {
    let live = portals.iter().map(|(e, _)| e).collect::<Vec<_>>();
    for (entity, mut portal) in &mut portals {
        if let Some(partner) = portal.linked {
            if !live.contains(&partner) {
                info!("Portal {:?} lost its partner {:?}", entity, partner);
                portal.linked = None;
            }
        }
    }
}

fn make_render_target(size: u32) -> Image {
    let extent = Extent3d {
        width: size,
        height: size,
        ..default()
    };
    let mut image = Image {
        texture_descriptor: TextureDescriptor {
            label: None,
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Bgra8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_DST
                | TextureUsages::RENDER_ATTACHMENT,
        },
        ..default()
    };
    image.resize(extent);
    image
}

/// Lazily create render targets and one secondary camera per
/// (portal, viewer) pair. A changed texture size drops the old target and
/// its cameras; they come back next frame at the new resolution.
fn create_portal_cameras(
    mut commands: Commands,
    mut arena: ResMut<PortalCameraArena>,
    mut images: ResMut<Assets<Image>>,
    portals: Query<(Entity, &Portal), With<Handle<PortalMaterial>>>,
    viewers: Query<(Entity, &Camera), Without<PortalViewCamera>>,
) {
    for (portal_entity, portal) in &portals {
        if !portal.enabled || portal.linked.is_none() {
            continue;
        }

        let stale = arena
            .targets
            .get(&portal_entity)
            .map_or(true, |t| t.size != portal.texture_size);
        if stale {
            if let Some(old) = arena.targets.remove(&portal_entity) {
                images.remove(&old.image);
                let dropped = arena
                    .cameras
                    .iter()
                    .filter(|((p, _), _)| *p == portal_entity)
                    .map(|(k, cam)| (*k, *cam))
                    .collect::<Vec<_>>();
                for (key, cam) in dropped {
                    arena.cameras.remove(&key);
                    commands.entity(cam).despawn_recursive();
                }
            }
            let image = images.add(make_render_target(portal.texture_size));
            arena.targets.insert(
                portal_entity,
                PortalTarget {
                    image,
                    size: portal.texture_size,
                },
            );
        }

        for (viewer_entity, camera) in &viewers {
            if !camera.is_active || !matches!(camera.target, RenderTarget::Window(_)) {
                continue;
            }
            let key = (portal_entity, viewer_entity);
            if arena.cameras.contains_key(&key) {
                continue;
            }
            let target = arena.targets[&portal_entity].image.clone();
            let camera = commands
                .spawn(Camera3dBundle {
                    camera: Camera {
                        // Render before the viewer camera.
                        priority: -1 - arena.cameras.len() as isize,
                        target: RenderTarget::Image(target),
                        ..default()
                    },
                    ..default()
                })
                .insert(PortalCameraProjection::default())
                .insert(PortalViewCamera {
                    portal: portal_entity,
                    viewer: viewer_entity,
                })
                .insert(portal.render_layers.without(NO_PORTAL_RENDER_LAYER))
                .insert(Name::from("Portal view camera"))
                .remove::<Projection>()
                .id();
            arena.cameras.insert(key, camera);
            info!(
                "Created portal view camera {:?} for portal {:?} / viewer {:?}",
                camera, portal_entity, viewer_entity
            );
        }
    }
}

/// Per-frame pose and clip plane update for every portal view camera.
fn sync_portal_cameras(
    guard: Res<RenderGuard>,
    portals: Query<(&Portal, &GlobalTransform)>,
    viewers: Query<
        (&GlobalTransform, Option<&Projection>, Option<&Camera3d>),
        (With<Camera>, Without<PortalViewCamera>),
    >,
    mut view_cams: Query<
        (
            &mut Transform,
            &mut PortalCameraProjection,
            &mut Camera3d,
            &mut RenderLayers,
            &PortalViewCamera,
        ),
        Without<Portal>,
    >,
) {
    for (mut cam_trf, mut proj, mut cam_3d, mut layers, view_cam) in &mut view_cams {
        let Ok((portal, portal_gtrf)) = portals.get(view_cam.portal) else { continue };
        if !portal.enabled {
            continue;
        }
        let Some(partner_entity) = portal.linked else { continue };
        let Ok((_, partner_gtrf)) = portals.get(partner_entity) else { continue };
        let Ok((viewer_gtrf, viewer_proj, viewer_3d)) = viewers.get(view_cam.viewer) else {
            continue;
        };

        let portal_trf = portal_gtrf.compute_transform();
        let partner_trf = partner_gtrf.compute_transform();
        let viewer_trf = viewer_gtrf.compute_transform();

        let Some(pose) = guarded_portal_view(
            &guard,
            portal.shape,
            portal.mirror,
            &portal_trf,
            &partner_trf,
            &viewer_trf,
        ) else {
            continue;
        };

        // Match the viewer's framing and clear behavior. Orthographic
        // viewers are left alone; the oblique projection is perspective
        // only.
        if let Some(Projection::Perspective(p)) = viewer_proj {
            proj.fov = p.fov;
            proj.aspect_ratio = p.aspect_ratio;
            proj.near = p.near;
            proj.far = p.far;
        }
        if let Some(viewer_3d) = viewer_3d {
            cam_3d.clear_color = viewer_3d.clear_color.clone();
        }

        *cam_trf = Transform {
            translation: pose.translation,
            rotation: pose.rotation,
            scale: Vec3::ONE,
        };

        // The clip plane lives in the remapped view space; the correction
        // factor maps the rig's own view space into it.
        proj.clip_plane =
            geometry::camera_space_plane(pose.view_matrix, pose.clip_pos, pose.clip_normal, 1.);
        proj.view_correction = pose.view_matrix * cam_trf.compute_matrix();

        let mut mask = portal.render_layers.without(NO_PORTAL_RENDER_LAYER);
        if portal.disable_pixel_lights {
            mask = mask.without(DYNAMIC_LIGHTS_LAYER);
        }
        if *layers != mask {
            *layers = mask;
        }
    }
}

/// Write each portal's render target into the portal-texture slot of its
/// surface materials (the portal's own and its children's).
fn apply_portal_textures(
    arena: Res<PortalCameraArena>,
    portals: Query<(Entity, Option<&Children>), With<Portal>>,
    slots: Query<&Handle<PortalMaterial>>,
    mut materials: ResMut<Assets<PortalMaterial>>,
) {
    for (portal_entity, children) in &portals {
        let Some(target) = arena.targets.get(&portal_entity) else { continue };
        let entities = std::iter::once(portal_entity)
            .chain(children.into_iter().flat_map(|c| c.iter().copied()));
        for entity in entities {
            let Ok(handle) = slots.get(entity) else { continue };
            let needs_update = materials
                .get(handle)
                .map_or(false, |m| m.texture != target.image);
            if needs_update {
                if let Some(material) = materials.get_mut(handle) {
                    material.texture = target.image.clone();
                }
            }
        }
    }
}

/// Deterministically release cameras and targets whose portal is disabled
/// or gone, or whose viewer is gone.
fn release_portal_cameras(
    mut commands: Commands,
    mut arena: ResMut<PortalCameraArena>,
    mut images: ResMut<Assets<Image>>,
    portals: Query<&Portal>,
    viewers: Query<(), With<Camera>>,
) {
    let dead = arena
        .cameras
        .iter()
        .filter(|((portal, viewer), _)| {
            !portals
                .get(*portal)
                .map_or(false, |p| p.enabled && p.linked.is_some())
                || viewers.get(*viewer).is_err()
        })
        .map(|(k, cam)| (*k, *cam))
        .collect::<Vec<_>>();
    for (key, cam) in dead {
        arena.cameras.remove(&key);
        commands.entity(cam).despawn_recursive();
        debug!("Released portal view camera {:?}", cam);
    }

    let dead_targets = arena
        .targets
        .keys()
        .filter(|portal| !portals.get(**portal).map_or(false, |p| p.enabled))
        .copied()
        .collect::<Vec<_>>();
    for portal in dead_targets {
        if let Some(target) = arena.targets.remove(&portal) {
            images.remove(&target.image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec3_near(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a} != {b}");
    }

    #[test]
    fn view_matrix_is_the_translated_viewer_view() {
        let portal = Transform::from_xyz(0., 0., 0.);
        let partner = Transform::from_xyz(10., 0., 0.);
        let viewer = Transform::from_xyz(0., 1., 5.);
        let pose =
            portal_view_pose(PortalShape::Planar, false, &portal, &partner, &viewer).unwrap();

        let expected = viewer.compute_matrix().inverse()
            * Mat4::from_translation(Vec3::new(10., 0., 0.)).inverse();
        assert!((pose.view_matrix - expected).abs_diff_eq(Mat4::ZERO, 1e-5));
        // For a parallel pair the camera just rides the portal offset.
        assert_vec3_near(pose.translation, Vec3::new(10., 1., 5.));
    }

    #[test]
    fn mirror_mode_negates_the_local_viewer_position() {
        let portal = Transform::from_xyz(0., 0., 0.);
        let partner = Transform::from_xyz(10., 0., 0.);
        let viewer = Transform::from_xyz(0., 1., -5.);
        let pose =
            portal_view_pose(PortalShape::Planar, true, &portal, &partner, &viewer).unwrap();
        assert_vec3_near(pose.translation, Vec3::new(10., -1., 5.));
    }

    #[test]
    fn planar_clip_normal_faces_the_rendered_side() {
        let portal = Transform::default();
        let partner = Transform::from_xyz(10., 0., 0.);
        // Viewer on the side the portal faces (forward is -Z).
        let front = Transform::from_xyz(0., 0., -5.);
        let pose =
            portal_view_pose(PortalShape::Planar, false, &portal, &partner, &front).unwrap();
        assert_vec3_near(pose.clip_normal, Vec3::Z);
        assert_vec3_near(pose.clip_pos, partner.translation);
        // Viewer behind: the plane flips so it still parts viewer-side from
        // far side.
        let behind = Transform::from_xyz(0., 0., 5.);
        let pose =
            portal_view_pose(PortalShape::Planar, false, &portal, &partner, &behind).unwrap();
        assert_vec3_near(pose.clip_normal, Vec3::NEG_Z);
    }

    #[test]
    fn spherical_clip_pulls_in_near_the_partner() {
        let portal = Transform::default();
        let partner = Transform::from_xyz(10., 0., 0.);
        let shape = PortalShape::Spherical { clip_radius: 2. };

        // Far viewer: plane sits clip_radius behind the partner along the
        // view direction.
        let far_viewer = Transform::from_xyz(0., 0., -10.);
        let pose = portal_view_pose(shape, false, &portal, &partner, &far_viewer).unwrap();
        assert_vec3_near(pose.clip_pos, Vec3::new(10., 0., 2.));

        // Close viewer: the computed camera would sit inside the clip
        // radius, so the plane pulls in next to it.
        let near_viewer = Transform::from_xyz(0., 0., -1.);
        let pose = portal_view_pose(shape, false, &portal, &partner, &near_viewer).unwrap();
        assert_vec3_near(pose.clip_pos, Vec3::new(10., 0., -1.) + Vec3::NEG_Z * 0.7);
    }

    #[test]
    fn secondary_rotation_discards_viewer_roll() {
        let portal = Transform::default();
        let partner = Transform::from_xyz(4., 0., 0.);
        let viewer = Transform::from_xyz(0., 0., 5.)
            .with_rotation(Quat::from_euler(EulerRot::YXZ, 0.3, 0.2, 0.7));
        let pose =
            portal_view_pose(PortalShape::Planar, false, &portal, &partner, &viewer).unwrap();
        let expected = Quat::from_euler(EulerRot::YXZ, 0.3, 0.2, 0.);
        assert!(pose.rotation.angle_between(expected) < 1e-4);
    }

    #[test]
    fn nested_render_attempts_are_no_ops_while_guard_is_held() {
        let guard = RenderGuard::default();
        let portal = Transform::default();
        let partner = Transform::from_xyz(10., 0., 0.);
        let viewer = Transform::from_xyz(0., 0., -5.);

        let pass = guard.try_acquire().unwrap();
        assert!(guard
            .try_acquire()
            .map(|_| ())
            .is_none());
        assert!(guarded_portal_view(
            &guard,
            PortalShape::Planar,
            false,
            &portal,
            &partner,
            &viewer
        )
        .is_none());
        drop(pass);

        // Released on drop, including early-out paths.
        assert!(!guard.is_held());
        assert!(guarded_portal_view(
            &guard,
            PortalShape::Planar,
            false,
            &portal,
            &partner,
            &viewer
        )
        .is_some());
        assert!(!guard.is_held());
    }
}

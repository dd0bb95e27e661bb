//! Pairing glue: opens a linked portal pair and closes it again.
//!
//! Gameplay only sends [`OpenPortalPair`]/[`ClosePortalPair`]; everything
//! about linking the two members (portal back-references, teleporter
//! back-references, the shared open/close animation) happens here.

use bevy::{prelude::*, render::view::RenderLayers};
use bevy_rapier3d::prelude::*;

use crate::plugins::physics::*;

use super::{
    sphere_teleport::SphereTeleporter, teleport::PortalTeleporter, waver::Waver, Portal,
    PortalMaterial, PortalSettings, PortalShape, PORTAL_SURFACE_LAYER,
};

/// The currently opened pair, if any. One pair at a time.
#[derive(Debug, Default, Resource)]
pub struct ActivePortalPair(pub Option<[Entity; 2]>);

#[derive(Debug, Resource)]
pub struct PortalAssets {
    pub quad: Handle<Mesh>,
    pub sphere: Handle<Mesh>,
}

pub fn load_portal_assets(mut commands: Commands, mut meshes: ResMut<Assets<Mesh>>) {
    let quad = meshes.add(
        shape::Quad {
            size: Vec2::new(2., 2.),
            flip: false,
        }
        .into(),
    );
    let sphere = meshes.add(
        shape::UVSphere {
            radius: 1.,
            sectors: 24,
            stacks: 18,
        }
        .into(),
    );
    commands.insert_resource(PortalAssets { quad, sphere });
}

/// Open a pair with the first member at `transform` and the partner at
/// `transform` shifted by `offset`, same orientation.
#[derive(Debug)]
pub struct OpenPortalPair {
    pub transform: Transform,
    pub offset: Vec3,
}

#[derive(Debug)]
pub struct ClosePortalPair;

pub fn open_portal_pairs(
    mut events: EventReader<OpenPortalPair>,
    mut commands: Commands,
    mut active: ResMut<ActivePortalPair>,
    mut materials: ResMut<Assets<PortalMaterial>>,
    assets: Res<PortalAssets>,
    settings: Res<PortalSettings>,
    portals: Query<(), With<Portal>>,
) {
    // A pair closed from outside the glue (editor, level unload) leaves a
    // stale registry entry behind.
    if let Some([a, b]) = active.0 {
        if portals.get(a).is_err() && portals.get(b).is_err() {
            active.0 = None;
        }
    }

    for event in events.iter() {
        if active.0.is_some() {
            warn!("Ignoring portal pair request, a pair is already open");
            continue;
        }

        let first = event.transform;
        let second = Transform {
            translation: first.translation + event.offset,
            ..first
        };
        let a = spawn_portal_surface(&mut commands, &assets, &mut materials, &settings, first);
        let b = spawn_portal_surface(&mut commands, &assets, &mut materials, &settings, second);

        link_portal(&mut commands, a, b, &settings);
        link_portal(&mut commands, b, a, &settings);
        commands.entity(a).insert(Waver::opening(first.scale, Some(b)));

        active.0 = Some([a, b]);
        info!("Opened portal pair {:?} <-> {:?}", a, b);
    }
}

/// Surface mesh, per-portal material instance and sensor collider for one
/// member.
fn spawn_portal_surface(
    commands: &mut Commands,
    assets: &PortalAssets,
    materials: &mut Assets<PortalMaterial>,
    settings: &PortalSettings,
    transform: Transform,
) -> Entity {
    // Each portal needs its own material so both members can show their own
    // view at once.
    let material = materials.add(PortalMaterial {
        texture: Handle::default(),
    });
    let (mesh, collider) = if settings.spherical {
        (assets.sphere.clone(), Collider::ball(1.))
    } else {
        (assets.quad.clone(), Collider::cuboid(1., 1., 0.6))
    };
    commands
        .spawn(MaterialMeshBundle {
            mesh,
            material,
            transform,
            ..default()
        })
        .insert((
            RenderLayers::layer(PORTAL_SURFACE_LAYER),
            Sensor,
            ActiveEvents::COLLISION_EVENTS,
            CollisionGroups::new(PORTAL_GROUP, PLAYER_GROUP | PROPS_GROUP),
            collider,
            Name::from("Portal"),
        ))
        .id()
}

/// Attach the render and teleport halves, back-referencing the partner.
fn link_portal(commands: &mut Commands, portal: Entity, partner: Entity, settings: &PortalSettings) {
    let shape = if settings.spherical {
        PortalShape::Spherical {
            clip_radius: settings.clip_radius,
        }
    } else {
        PortalShape::Planar
    };
    let mut entity = commands.entity(portal);
    entity.insert(Portal {
        linked: Some(partner),
        shape,
        mirror: settings.mirror,
        disable_pixel_lights: settings.disable_pixel_lights,
        texture_size: settings.texture_size,
        ..default()
    });
    if settings.spherical {
        entity.insert(SphereTeleporter {
            linked: Some(partner),
            no_teleport: settings.no_teleport.clone(),
            ..default()
        });
    } else {
        entity.insert(PortalTeleporter {
            linked: Some(partner),
            mirror: settings.mirror,
            no_teleport: settings.no_teleport.clone(),
            ..default()
        });
    }
}

pub fn close_portal_pairs(
    mut events: EventReader<ClosePortalPair>,
    mut active: ResMut<ActivePortalPair>,
    mut wavers: Query<&mut Waver>,
) {
    for _ in events.iter() {
        let Some([a, _]) = active.0 else { continue };
        if let Ok(mut waver) = wavers.get_mut(a) {
            waver.close();
            info!("Closing portal pair");
        }
        active.0 = None;
    }
}

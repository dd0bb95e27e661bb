use std::f32::consts::*;

use bevy::{prelude::*, render::view::RenderLayers};
use bevy_rapier3d::prelude::*;
use leafwing_input_manager::prelude::ActionState;

use crate::{plugins::*, util::scenes::make_arena_layer};

use crate::plugins::first_person_controller::{
    FirstPersonCamera, FirstPersonController, FirstPersonControllerBundle,
};
use crate::plugins::input::Actions;
use crate::plugins::physics::*;
use crate::plugins::portal::{
    dimension::DimensionTwin,
    spawn::{ActivePortalPair, ClosePortalPair, OpenPortalPair},
    PortalSettings, DYNAMIC_LIGHTS_LAYER,
};

#[derive(Debug)]
/// Main game plugin, responsible for loading the other game plugins and bootstrapping the game.
pub struct GamePlugin;

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        #[cfg(feature = "devel")]
        {
            app.add_plugins(debug::DeveloperPlugins);
        }

        app.add_plugin(RapierPhysicsPlugin::<NoUserData>::default());
        app.add_plugin(physics::PhysicsPlugin);
        app.add_plugin(input::InputPlugin);
        app.add_plugin(first_person_controller::FirstPersonControllerPlugin);
        app.add_plugin(portal::PortalPlugin);

        app.add_startup_system(setup)
            .add_system(fire_portals)
            .add_system(toss_balls)
            .add_system(despawn_expired);
    }
}

#[derive(Debug, Resource)]
struct GameAssets {
    ball_mesh: Handle<Mesh>,
    ball_material: Handle<StandardMaterial>,
}

#[derive(Debug, Component)]
struct Lifetime(Timer);

/// Perform game initialization: both arena layers, lighting, the player,
/// and the prop assets.
fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    settings: Res<PortalSettings>,
) {
    let layer_offset = Vec3::Y * settings.dimension_offset;
    make_arena_layer(&mut commands, &mut meshes, &mut materials, 20., 3., Vec3::ZERO);
    make_arena_layer(&mut commands, &mut meshes, &mut materials, 20., 3., layer_offset);

    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            color: Color::ANTIQUE_WHITE,
            illuminance: 20_000.,
            shadows_enabled: true,
            ..default()
        },
        transform: Transform {
            translation: Vec3::Y * 5.,
            rotation: Quat::from_euler(EulerRot::YXZ, FRAC_PI_4, FRAC_PI_4, 0.),
            scale: Vec3::ONE,
        },
        ..default()
    });

    // One dynamic light per layer, on the layer portals may suppress.
    for offset in [Vec3::ZERO, layer_offset] {
        commands
            .spawn(PointLightBundle {
                point_light: PointLight {
                    intensity: 1200.,
                    range: 25.,
                    ..default()
                },
                transform: Transform::from_translation(offset + Vec3::new(0., 2.5, 0.)),
                ..default()
            })
            .insert(RenderLayers::layer(DYNAMIC_LIGHTS_LAYER));
    }

    // A beacon prop mirrored into the upper layer, so both layers stay
    // visually registered through a portal.
    let beacon_mesh = meshes.add(
        shape::UVSphere {
            radius: 0.3,
            sectors: 16,
            stacks: 12,
        }
        .into(),
    );
    let beacon_material = materials.add(StandardMaterial {
        base_color: Color::PURPLE,
        emissive: Color::PURPLE * 0.4,
        ..default()
    });
    let beacon = commands
        .spawn(PbrBundle {
            mesh: beacon_mesh.clone(),
            material: beacon_material.clone(),
            transform: Transform::from_xyz(6., 1., -6.),
            ..default()
        })
        .insert(Name::from("Beacon"))
        .id();
    commands
        .spawn(PbrBundle {
            mesh: beacon_mesh,
            material: beacon_material,
            transform: Transform::from_translation(Vec3::new(6., 1., -6.) + layer_offset),
            ..default()
        })
        .insert((
            Name::from("Beacon twin"),
            DimensionTwin {
                leader: beacon,
                offset: layer_offset,
            },
        ));

    commands
        .spawn(FirstPersonControllerBundle {
            spatial: SpatialBundle::from(Transform::from_xyz(0., 1.5, 5.)),
            ..default()
        })
        .insert(Name::from("Player spawner"));

    let ball_mesh = meshes.add(
        shape::UVSphere {
            radius: 0.2,
            sectors: 16,
            stacks: 12,
        }
        .into(),
    );
    let ball_material = materials.add(StandardMaterial::from(Color::ORANGE));
    commands.insert_resource(GameAssets {
        ball_mesh,
        ball_material,
    });
}

/// On the fire action, toggle the portal pair: close the open one, or open
/// a new pair in front of the player with the partner at the layer offset
/// picked by the player's current dimension.
fn fire_portals(
    players: Query<(&ActionState<Actions>, &FirstPersonController)>,
    cameras: Query<&GlobalTransform, With<FirstPersonCamera>>,
    active: Res<ActivePortalPair>,
    settings: Res<PortalSettings>,
    mut open_events: EventWriter<OpenPortalPair>,
    mut close_events: EventWriter<ClosePortalPair>,
) {
    let Ok((actions, controller)) = players.get_single() else { return };
    if !actions.just_pressed(Actions::FirePortals) {
        return;
    }
    if active.0.is_some() {
        close_events.send(ClosePortalPair);
        return;
    }
    let Ok(camera) = cameras.get_single() else { return };
    let camera = camera.compute_transform();

    let position = camera.translation + camera.forward() * settings.spawn_range;
    let transform = Transform::from_translation(position).looking_at(camera.translation, Vec3::Y);
    let offset = if controller.dimension {
        Vec3::Y * -settings.dimension_offset
    } else {
        Vec3::Y * settings.dimension_offset
    };
    open_events.send(OpenPortalPair { transform, offset });
}

const BALL_SPEED: f32 = 9.;
const BALL_LIFETIME: f32 = 5.;

fn toss_balls(
    mut commands: Commands,
    players: Query<&ActionState<Actions>, With<FirstPersonController>>,
    cameras: Query<&GlobalTransform, With<FirstPersonCamera>>,
    assets: Res<GameAssets>,
) {
    let Ok(actions) = players.get_single() else { return };
    if !actions.just_pressed(Actions::TossBall) {
        return;
    }
    let Ok(camera) = cameras.get_single() else { return };
    let camera = camera.compute_transform();

    commands
        .spawn(PbrBundle {
            mesh: assets.ball_mesh.clone(),
            material: assets.ball_material.clone(),
            transform: Transform::from_translation(camera.translation + camera.forward()),
            ..default()
        })
        .insert((
            Name::from("Ball"),
            RigidBody::Dynamic,
            Collider::ball(0.2),
            Velocity {
                linvel: camera.forward() * BALL_SPEED,
                ..default()
            },
            Ccd { enabled: true },
            CollisionGroups::new(PROPS_GROUP, ALL_GROUPS),
            Lifetime(Timer::from_seconds(BALL_LIFETIME, TimerMode::Once)),
        ));
}

fn despawn_expired(
    mut commands: Commands,
    time: Res<Time>,
    mut lifetimes: Query<(Entity, &mut Lifetime)>,
) {
    for (entity, mut lifetime) in &mut lifetimes {
        if lifetime.0.tick(time.delta()).finished() {
            commands.entity(entity).despawn_recursive();
        }
    }
}

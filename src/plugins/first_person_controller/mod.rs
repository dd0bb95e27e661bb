//! First person locomotion.
//!
//! The controller doubles as the teleport engine's locomotion collaborator:
//! it carries the `dimension` flag flipped on every portal crossing, and its
//! signed target speed is what a mirror crossing negates to reverse intended
//! travel.

use bevy::{prelude::*, reflect::FromReflect, render::camera::Projection};
use bevy_rapier3d::prelude::*;
use euclid::Angle;
use leafwing_input_manager::prelude::*;

use crate::plugins::{input::default_input_map, physics::*};

use super::input::Actions;

pub const DEFAULT_TARGET_SPEED: f32 = 3.;
const MOUSE_SENSITIVITY: f32 = 0.004;
const MOUSE_ANGVEL_MULTIPLIER: f32 = -75.;
const SPRINT_MULTIPLIER: f32 = 2.;

const PLAYER_HEIGHT: f32 = 1.8;
const EYE_HEIGHT: f32 = 1.25;

#[derive(Debug)]
/// First person controller plugin, which registers the required systems to use the first person
/// controller also provided by this module.
pub struct FirstPersonControllerPlugin;

impl Plugin for FirstPersonControllerPlugin {
    fn build(&self, app: &mut App) {
        app.add_system(spawn_controllers.label(FirstPersonLabels::SpawnControllers))
            .add_system(process_controller_inputs.label(FirstPersonLabels::ProcessInputs));
    }
}

#[derive(Debug, SystemLabel)]
/// Labels for the first person controller systems.
pub enum FirstPersonLabels {
    SpawnControllers,
    ProcessInputs,
}

#[derive(Debug, Component)]
/// First person controller component.
pub struct FirstPersonController {
    pub theta: Angle<f32>,
    pub phi: Angle<f32>,
    pub camera_anchor: Entity,
    /// Which world layer the player currently occupies. Toggled by the
    /// teleport engine, read by the spawn glue to aim the partner portal.
    pub dimension: bool,
    /// Signed walking speed target. Mirror crossings negate it, so intended
    /// travel reverses in the mirrored layer.
    pub current_target_speed: f32,
}

#[derive(Debug, Default, Component, Reflect, FromReflect)]
#[reflect(Component)]
/// Marker trait for first person cameras
pub struct FirstPersonCamera;

/// Spawn-request marker, replaced with the full controller hierarchy by
/// [`spawn_controllers`].
#[derive(Debug, Component, Default, Reflect, FromReflect)]
#[reflect(Component)]
pub struct FirstPersonControllerSpawner {}

#[derive(Debug, Bundle, Default)]
pub struct FirstPersonControllerBundle {
    pub spatial: SpatialBundle,
    pub spawner: FirstPersonControllerSpawner,
}

/// Builds the capsule body, camera anchor and eye camera on every entity
/// carrying a spawner marker.
fn spawn_controllers(
    mut commands: Commands,
    spawners: Query<Entity, With<FirstPersonControllerSpawner>>,
) {
    for id in &spawners {
        let camera_anchor = commands
            .spawn(SpatialBundle::from(Transform::from_xyz(
                0.,
                EYE_HEIGHT - PLAYER_HEIGHT / 2.,
                0.,
            )))
            .insert(Name::from("Camera anchor"))
            .with_children(|anchor| {
                anchor
                    .spawn(Camera3dBundle {
                        projection: Projection::Perspective(PerspectiveProjection {
                            fov: std::f32::consts::FRAC_PI_4,
                            aspect_ratio: 16. / 9.,
                            near: 0.1,
                            far: 1000.,
                        }),
                        ..default()
                    })
                    .insert((Name::from("Player camera"), FirstPersonCamera));
            })
            .id();

        commands
            .entity(id)
            .insert(InputManagerBundle {
                action_state: ActionState::default(),
                input_map: default_input_map(),
            })
            .insert((
                RigidBody::Dynamic,
                Collider::capsule_y(PLAYER_HEIGHT / 2., 0.4),
                LockedAxes::ROTATION_LOCKED_X | LockedAxes::ROTATION_LOCKED_Z,
                Velocity::default(),
                Ccd { enabled: true },
                Name::from("Player"),
                CollisionGroups::new(PLAYER_GROUP, ALL_GROUPS),
            ))
            .insert(FirstPersonController {
                theta: Angle::zero(),
                phi: Angle::zero(),
                camera_anchor,
                dimension: false,
                current_target_speed: DEFAULT_TARGET_SPEED,
            })
            .add_child(camera_anchor)
            .remove::<FirstPersonControllerSpawner>();
    }
}

fn process_controller_inputs(
    mut players: Query<(
        &ActionState<Actions>,
        &mut FirstPersonController,
        &mut Velocity,
        &Transform,
    )>,
    mut anchors: Query<&mut Transform, Without<FirstPersonController>>,
) {
    for (input, mut controller, mut velocity, transform) in &mut players {
        // Wish direction in the ground plane from the held movement keys.
        let mut wish = Vec3::ZERO;
        if input.pressed(Actions::Forward) {
            wish += transform.forward();
        }
        if input.pressed(Actions::Backwards) {
            wish -= transform.forward();
        }
        if input.pressed(Actions::StrafeLeft) {
            wish += transform.left();
        }
        if input.pressed(Actions::StrafeRight) {
            wish -= transform.left();
        }
        wish.y = 0.;

        // The target speed is signed; after a mirror crossing it runs
        // negative and walking forward carries the player backwards.
        let mut speed = controller.current_target_speed;
        if input.pressed(Actions::Sprint) {
            speed *= SPRINT_MULTIPLIER;
        }
        let planar = wish.normalize_or_zero() * speed;
        velocity.linvel = Vec3::new(planar.x, velocity.linvel.y, planar.z);

        // Yaw turns the body through its angular velocity; pitch rotates
        // only the camera anchor so the capsule stays upright.
        if let Some(aim) = input.axis_pair(Actions::Aim) {
            controller.theta += Angle::radians(aim.x()) * MOUSE_SENSITIVITY;
            controller.phi += Angle::radians(aim.y() * MOUSE_SENSITIVITY);
            controller.phi.radians = controller
                .phi
                .radians
                .clamp(-std::f32::consts::FRAC_PI_2, std::f32::consts::FRAC_PI_2);

            velocity.angvel.y = aim.x() * MOUSE_SENSITIVITY * MOUSE_ANGVEL_MULTIPLIER;
            if let Ok(mut anchor) = anchors.get_mut(controller.camera_anchor) {
                anchor.rotation = Quat::from_axis_angle(Vec3::X, -controller.phi.radians);
            }
        } else {
            velocity.angvel.y = 0.;
        }
    }
}

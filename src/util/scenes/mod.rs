use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::plugins::physics::*;

const SLAB_THICKNESS: f32 = 1.;

/// Builds one square arena room: ground and ceiling slabs plus four colored
/// walls, all with fixed colliders. `layer_offset` lifts the room to its
/// world layer; everything hangs off the ground entity so the offset moves
/// the room as one piece.
pub fn make_arena_layer(
    commands: &mut Commands,
    meshes: &mut ResMut<Assets<Mesh>>,
    materials: &mut ResMut<Assets<StandardMaterial>>,
    length: f32,
    height: f32,
    layer_offset: Vec3,
) {
    let half = length / 2.;
    let slab_half = half * 1.1;

    let slab_mesh = meshes.add(shape::Box::new(slab_half * 2., SLAB_THICKNESS, slab_half * 2.).into());
    let wall_mesh = meshes.add(shape::Box::new(length, height, SLAB_THICKNESS).into());
    let slab_material = materials.add(StandardMaterial::from(Color::DARK_GRAY));
    // One color per cardinal wall, to keep orientation readable through a
    // portal.
    let wall_colors = [Color::RED, Color::GREEN, Color::BLUE, Color::ANTIQUE_WHITE];

    let mut ground = commands.spawn(PbrBundle {
        mesh: slab_mesh.clone(),
        material: slab_material.clone(),
        transform: Transform::from_translation(layer_offset - Vec3::Y * SLAB_THICKNESS / 2.),
        ..default()
    });
    ground.insert((
        Name::from("Ground"),
        RigidBody::Fixed,
        Collider::cuboid(slab_half, SLAB_THICKNESS / 2., slab_half),
        CollisionGroups::new(GROUND_GROUP, ALL_GROUPS),
    ));

    ground.with_children(|room| {
        for (i, color) in wall_colors.into_iter().enumerate() {
            let mut transform =
                Transform::from_xyz(0., height / 2., -(half + SLAB_THICKNESS / 2.));
            transform.rotate_around(
                Vec3::Y * height / 2.,
                Quat::from_axis_angle(Vec3::Y, i as f32 * FRAC_PI_2),
            );
            room.spawn(PbrBundle {
                mesh: wall_mesh.clone(),
                material: materials.add(StandardMaterial::from(color)),
                transform,
                ..default()
            })
            .insert((
                Name::from("Wall"),
                RigidBody::Fixed,
                Collider::cuboid(half, height / 2., SLAB_THICKNESS / 2.),
                CollisionGroups::new(WALLS_GROUP, ALL_GROUPS),
            ));
        }
        room.spawn(PbrBundle {
            mesh: slab_mesh,
            material: slab_material,
            transform: Transform::from_translation(Vec3::Y * height),
            ..default()
        })
        .insert((
            Name::from("Ceiling"),
            RigidBody::Fixed,
            Collider::cuboid(slab_half, SLAB_THICKNESS / 2., slab_half),
            CollisionGroups::new(GROUND_GROUP, ALL_GROUPS),
        ));
    });
}

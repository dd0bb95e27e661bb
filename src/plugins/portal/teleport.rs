//! Planar teleport continuity engine.
//!
//! Bodies entering a portal's sensor volume are tracked with the reference
//! point recorded at entry; every simulation step the engine looks for the
//! frame the reference point crosses the portal plane and relocates the
//! body into the partner portal's frame with velocity, heading and the
//! traveler's dimension flag kept continuous.

use bevy::{prelude::*, utils::HashMap};
use bevy_rapier3d::prelude::*;

use crate::plugins::{first_person_controller::FirstPersonController, physics::*};

use super::geometry;

/// Offset along the portal normal applied to the crossing tests, so a
/// reference point sitting exactly on the plane still produces a usable
/// sign.
const BOUNDARY_OFFSET: f32 = 0.05;
/// Push past the partner surface on exit, avoiding an immediate re-trigger.
const EXIT_PUSH: f32 = 0.1;

/// Crossing reference point, resolved once when a body is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePoint {
    /// The body's own origin.
    Own,
    /// The pivot of a camera somewhere below the body.
    Camera(Entity),
}

#[derive(Debug, Clone)]
pub struct TrackedBody {
    /// Reference point position recorded when the body entered the volume.
    pub origin: Vec3,
    pub reference: ReferencePoint,
    /// Locomotion controller carrying the dimension flag, if the body has
    /// one.
    pub controller: Option<Entity>,
}

/// Teleporting half of a planar portal. Lives on the same entity as the
/// sensor collider.
#[derive(Debug, Component, Default)]
pub struct PortalTeleporter {
    /// The partner teleporter; a non-owning back-reference.
    pub linked: Option<Entity>,
    pub mirror: bool,
    /// Names that never teleport.
    pub no_teleport: Vec<String>,
    /// Bodies currently inside the sensor volume.
    pub tracked: HashMap<Entity, TrackedBody>,
}

/// Tests whether a reference point moving from its recorded entry position
/// (`origin`) to `current` has crossed the portal plane. Returns the side
/// the body entered from (as a sign along `fwd`) when it has.
///
/// Both dots are taken against a point offset `BOUNDARY_OFFSET` along the
/// normal from the portal center; a body that started exactly on the plane
/// counts as on the positive side.
pub fn crossing_side(fwd: Vec3, portal_pos: Vec3, origin: Vec3, current: Vec3) -> Option<f32> {
    let actual_dot = fwd.dot(origin - portal_pos);
    let offset = portal_pos + fwd * BOUNDARY_OFFSET * if actual_dot < 0. { -1. } else { 1. };
    let original_dot = fwd.dot(origin - offset);
    let current_dot = fwd.dot(current - offset);
    // A body that registered inside the boundary band already reads as
    // flipped relative to its own entry side.
    if actual_dot > 0. && original_dot < 0. || actual_dot < 0. && original_dot > 0. {
        return Some(entry_side(actual_dot, current_dot));
    }
    if current_dot > 0. && original_dot < 0. || current_dot < 0. && original_dot > 0. {
        return Some(entry_side(actual_dot, current_dot));
    }
    None
}

fn entry_side(actual_dot: f32, current_dot: f32) -> f32 {
    if actual_dot != 0. {
        geometry::sgn(actual_dot)
    } else {
        geometry::sgn(current_dot)
    }
}

/// Maps a world point from the portal's local frame into the partner's.
pub fn remap_point(portal: &Transform, partner: &Transform, point: Vec3) -> Vec3 {
    partner
        .compute_matrix()
        .transform_point3(portal.compute_matrix().inverse().transform_point3(point))
}

/// Where a body crossing from `entry_side` lands: the frame remap of its
/// reference point, pushed past the partner surface, corrected back from
/// the reference point to the body's own origin.
pub fn planar_exit_position(
    portal: &Transform,
    partner: &Transform,
    mirror: bool,
    entry_side: f32,
    current_ref: Vec3,
    pivot_offset: Vec3,
) -> Vec3 {
    let mut push = partner.forward() * EXIT_PUSH;
    if mirror {
        push = -push;
    }
    remap_point(portal, partner, current_ref) - push * entry_side + pivot_offset
}

/// Velocity through a mirror portal: reflected across the portal normal.
pub fn mirror_velocity(v: Vec3, normal: Vec3) -> Vec3 {
    geometry::reflect(v, normal)
}

/// Heading through a mirror portal: forward reflected across the portal
/// normal, up preserved. `None` when the reflected forward is degenerate.
pub fn mirror_heading(rotation: Quat, normal: Vec3) -> Option<Quat> {
    let forward = rotation * Vec3::NEG_Z;
    let up = rotation * Vec3::Y;
    geometry::look_rotation(geometry::reflect(forward, normal), up)
}

/// Depth-first search for an entity in `root`'s hierarchy (including
/// `root`) matching the predicate.
pub(super) fn find_in_hierarchy(
    root: Entity,
    children: &Query<&Children>,
    pred: impl Fn(Entity) -> bool,
) -> Option<Entity> {
    let mut stack = vec![root];
    while let Some(entity) = stack.pop() {
        if pred(entity) {
            return Some(entity);
        }
        if let Ok(c) = children.get(entity) {
            stack.extend(c.iter().copied());
        }
    }
    None
}

/// Register bodies entering a teleporter's sensor volume and drop bodies
/// leaving it. Capabilities (camera reference point, locomotion
/// controller) are resolved here, once.
pub fn track_trigger_membership(
    mut collisions: EventReader<CollisionEvent>,
    mut teleporters: Query<&mut PortalTeleporter>,
    names: Query<&Name>,
    cameras: Query<(), With<Camera>>,
    controllers: Query<(), With<FirstPersonController>>,
    children: Query<&Children>,
    transforms: Query<&GlobalTransform>,
) {
    for collision in collisions.iter() {
        let (started, a, b) = match collision {
            CollisionEvent::Started(a, b, _) => (true, *a, *b),
            CollisionEvent::Stopped(a, b, _) => (false, *a, *b),
        };
        for (portal_entity, body) in [(a, b), (b, a)] {
            let Ok(mut teleporter) = teleporters.get_mut(portal_entity) else { continue };
            if !started {
                if teleporter.tracked.remove(&body).is_some() {
                    debug!("Body {:?} left portal {:?}", body, portal_entity);
                }
                continue;
            }
            if let Ok(name) = names.get(body) {
                if teleporter.no_teleport.iter().any(|t| t == name.as_str()) {
                    continue;
                }
            }
            if teleporter.tracked.contains_key(&body) {
                continue;
            }
            let camera = find_in_hierarchy(body, &children, |e| cameras.get(e).is_ok());
            let controller = find_in_hierarchy(body, &children, |e| controllers.get(e).is_ok());
            let reference = camera.map_or(ReferencePoint::Own, ReferencePoint::Camera);
            let Ok(origin) = transforms.get(camera.unwrap_or(body)) else { continue };
            debug!("Body {:?} entered portal {:?}", body, portal_entity);
            teleporter.tracked.insert(
                body,
                TrackedBody {
                    origin: origin.translation(),
                    reference,
                    controller,
                },
            );
        }
    }
}

struct PendingTeleport {
    portal: Entity,
    body: Entity,
    new_pos: Vec3,
    mirror: bool,
    normal: Vec3,
    controller: Option<Entity>,
}

/// Fixed-step crossing detection and relocation.
pub fn teleport_crossed_objects(
    mut teleporters: Query<(Entity, &mut PortalTeleporter, &GlobalTransform)>,
    transforms: Query<&GlobalTransform>,
    mut bodies: Query<(&mut Transform, Option<&mut Velocity>)>,
    mut controllers: Query<&mut FirstPersonController>,
) {
    let mut pending = Vec::new();
    for (portal_entity, teleporter, portal_gtrf) in teleporters.iter() {
        let Some(partner_entity) = teleporter.linked else { continue };
        let Ok((_, _, partner_gtrf)) = teleporters.get(partner_entity) else { continue };
        let portal_trf = portal_gtrf.compute_transform();
        let partner_trf = partner_gtrf.compute_transform();
        let fwd = portal_trf.forward();

        for (body, tracked) in teleporter.tracked.iter() {
            let reference_entity = match tracked.reference {
                ReferencePoint::Camera(camera) => camera,
                ReferencePoint::Own => *body,
            };
            let Ok(current) = transforms.get(reference_entity) else { continue };
            let current = current.translation();
            let Some(side) =
                crossing_side(fwd, portal_trf.translation, tracked.origin, current)
            else {
                continue;
            };
            // Line the visual viewpoint up with the partner surface, not
            // the body's nominal origin.
            let pivot_offset = match tracked.reference {
                ReferencePoint::Camera(_) => transforms
                    .get(*body)
                    .map(|t| t.translation())
                    .unwrap_or(current)
                    - current,
                ReferencePoint::Own => Vec3::ZERO,
            };
            pending.push(PendingTeleport {
                portal: portal_entity,
                body: *body,
                new_pos: planar_exit_position(
                    &portal_trf,
                    &partner_trf,
                    teleporter.mirror,
                    side,
                    current,
                    pivot_offset,
                ),
                mirror: teleporter.mirror,
                normal: fwd,
                controller: tracked.controller,
            });
        }
    }

    for op in pending {
        // Teleported bodies go straight back to untracked; the stale entry
        // side must not fire a second time before the sensor exit lands.
        if let Ok((_, mut teleporter, _)) = teleporters.get_mut(op.portal) {
            teleporter.tracked.remove(&op.body);
        }
        let Ok((mut transform, velocity)) = bodies.get_mut(op.body) else { continue };
        if op.mirror {
            if let Some(mut velocity) = velocity {
                velocity.linvel = mirror_velocity(velocity.linvel, op.normal);
            }
            if let Some(rotation) = mirror_heading(transform.rotation, op.normal) {
                transform.rotation = rotation;
            }
        }
        if let Some(controller_entity) = op.controller {
            if let Ok(mut controller) = controllers.get_mut(controller_entity) {
                controller.dimension = !controller.dimension;
                if op.mirror {
                    controller.current_target_speed = -controller.current_target_speed;
                }
            }
        }
        transform.translation = op.new_pos;
        info!("Teleported {:?} to {}", op.body, op.new_pos);
    }
}

/// While a body overlaps a portal sensor it may pass through the static
/// geometry the portal is mounted on; the filter comes back when it leaves.
pub fn relax_wall_collisions(
    mut collisions: EventReader<CollisionEvent>,
    teleporters: Query<
        (),
        Or<(
            With<PortalTeleporter>,
            With<super::sphere_teleport::SphereTeleporter>,
        )>,
    >,
    mut groups: Query<
        &mut CollisionGroups,
        (
            Without<PortalTeleporter>,
            Without<super::sphere_teleport::SphereTeleporter>,
        ),
    >,
) {
    for collision in collisions.iter() {
        let (started, a, b) = match collision {
            CollisionEvent::Started(a, b, _) => (true, *a, *b),
            CollisionEvent::Stopped(a, b, _) => (false, *a, *b),
        };
        for (portal, body) in [(a, b), (b, a)] {
            if teleporters.get(portal).is_err() {
                continue;
            }
            if let Ok(mut groups) = groups.get_mut(body) {
                groups.filters = if started {
                    PLAYER_GROUP | PROPS_GROUP | PORTAL_GROUP
                } else {
                    ALL_GROUPS
                };
            }
        }
    }
}

/// Null teleporter links pointing at despawned partners.
pub fn unlink_dead_teleporters(mut teleporters: Query<(Entity, &mut PortalTeleporter)>) {
    let live = teleporters.iter().map(|(e, _)| e).collect::<Vec<_>>();
    for (entity, mut teleporter) in &mut teleporters {
        if let Some(partner) = teleporter.linked {
            if !live.contains(&partner) {
                info!("Teleporter {:?} lost its partner {:?}", entity, partner);
                teleporter.linked = None;
            }
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
    fn sign_flip_between_entry_and_current_side_fires() {
        // Reference entered one unit behind the plane, now half a unit in
        // front: exactly one crossing.
        let side = crossing_side(
            Vec3::Z,
            Vec3::ZERO,
            Vec3::new(0., 0., -1.),
            Vec3::new(0., 0., 0.5),
        );
        assert_eq!(side, Some(-1.));
    }

    #[test]
    fn staying_on_the_entry_side_does_not_fire() {
        let side = crossing_side(
            Vec3::Z,
            Vec3::ZERO,
            Vec3::new(0., 0., -1.),
            Vec3::new(0., 0., -0.5),
        );
        assert_eq!(side, None);
    }

    #[test]
    fn entry_exactly_on_the_plane_counts_as_positive_side() {
        // actual dot is zero; the offset band resolves the side from the
        // current reading.
        let side = crossing_side(Vec3::Z, Vec3::ZERO, Vec3::ZERO, Vec3::new(0., 0., 0.5));
        assert_eq!(side, Some(1.));
    }

    #[test]
    fn entry_inside_the_boundary_band_fires_without_movement() {
        // Registered 0.03 in front: offset to the far side of the band the
        // recorded reading flips sign on its own.
        let side = crossing_side(
            Vec3::Z,
            Vec3::ZERO,
            Vec3::new(0., 0., 0.03),
            Vec3::new(0., 0., 0.03),
        );
        assert_eq!(side, Some(1.));
    }

    #[test]
    fn round_trip_returns_close_to_the_start() {
        let a = Transform::from_xyz(0., 0., 0.);
        let b = Transform::from_xyz(10., 0., 0.);
        let fwd = a.forward();

        let start = Vec3::new(0., 0., -0.5);
        let crossed = Vec3::new(0., 0., 0.5);
        let side = crossing_side(fwd, a.translation, start, crossed).unwrap();
        let arrived = planar_exit_position(&a, &b, false, side, crossed, Vec3::ZERO);

        let back_from = Vec3::new(10., 0., -0.5);
        let side_back = crossing_side(b.forward(), b.translation, arrived, back_from).unwrap();
        let returned = planar_exit_position(&b, &a, false, side_back, back_from, Vec3::ZERO);

        assert!((returned - start).length() < 0.25);

        // Dimension parity: one flip per crossing, even count restores it.
        let mut dimension = false;
        dimension = !dimension;
        dimension = !dimension;
        assert!(!dimension);
    }

    #[test]
    fn camera_pivot_offset_moves_the_body_origin() {
        let a = Transform::from_xyz(0., 0., 0.);
        let b = Transform::from_xyz(10., 0., 0.);
        let pivot = Vec3::new(0., -1.2, 0.);
        let with = planar_exit_position(&a, &b, false, 1., Vec3::new(0., 1.2, 0.1), pivot);
        let without = planar_exit_position(&a, &b, false, 1., Vec3::new(0., 1.2, 0.1), Vec3::ZERO);
        assert_vec3_near(with - without, pivot);
    }

    #[test]
    fn mirror_velocity_flips_only_the_normal_component() {
        let n = Vec3::Z;
        let v = Vec3::new(1., 2., 3.);
        let reflected = mirror_velocity(v, n);
        assert!((reflected.dot(n) + v.dot(n)).abs() < 1e-5);
        assert_vec3_near(
            Vec3::new(reflected.x, reflected.y, 0.),
            Vec3::new(v.x, v.y, 0.),
        );
    }

    #[test]
    fn mirror_heading_reflects_forward() {
        let rotation = Quat::IDENTITY; // facing -Z
        let reflected = mirror_heading(rotation, Vec3::Z).unwrap();
        assert_vec3_near(reflected * Vec3::NEG_Z, Vec3::Z);
        // Up is preserved through the reflection.
        assert_vec3_near(reflected * Vec3::Y, Vec3::Y);
    }
}

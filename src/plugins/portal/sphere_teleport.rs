//! Spherical teleport continuity engine.
//!
//! Unlike the planar engine there is no plane-side bookkeeping: a body is
//! noted while outside the exit radius, confirmed interior once its
//! reference point comes within it, and teleported the step its distance
//! from the portal center reaches the radius again.

use bevy::prelude::*;
use bevy_rapier3d::prelude::CollisionEvent;

use crate::plugins::first_person_controller::FirstPersonController;

use super::teleport::{find_in_hierarchy, remap_point, ReferencePoint};

/// Shrink on the exit radius so a body resting exactly on the collider
/// surface is not already outside.
const RADIUS_MARGIN: f32 = 0.05;
/// Radial nudge along the exit direction, keeping the arrival outside the
/// destination threshold.
const RADIAL_PUSH: f32 = 0.2;

/// Capabilities resolved when a body is registered.
#[derive(Debug, Clone, Copy)]
pub struct SphereTracked {
    pub reference: ReferencePoint,
    pub controller: Option<Entity>,
}

/// The two disjoint tracking sets of a spherical portal.
#[derive(Debug, Default)]
pub struct SphereMembership {
    notable: Vec<(Entity, SphereTracked)>,
    interior: Vec<(Entity, SphereTracked)>,
}

impl SphereMembership {
    /// Register a body entering the trigger volume. A body already in
    /// either set is left where it is.
    pub fn note(&mut self, entity: Entity, data: SphereTracked) {
        if self.contains(entity) {
            return;
        }
        self.notable.push((entity, data));
    }

    /// A body left the trigger volume without crossing.
    pub fn forget(&mut self, entity: Entity) {
        self.notable.retain(|(e, _)| *e != entity);
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.notable.iter().any(|(e, _)| *e == entity)
            || self.interior.iter().any(|(e, _)| *e == entity)
    }

    /// One simulation step: interior bodies at or beyond `threshold` from
    /// `center` are removed and returned for teleportation, then notable
    /// bodies within the threshold are confirmed interior. Bodies whose
    /// position can no longer be resolved are dropped.
    ///
    /// Removal iterates by descending index so a removal never skips the
    /// next element.
    pub fn step(
        &mut self,
        threshold: f32,
        center: Vec3,
        pos: impl Fn(Entity, &SphereTracked) -> Option<Vec3>,
    ) -> Vec<(Entity, SphereTracked)> {
        let mut departures = Vec::new();
        for i in (0..self.interior.len()).rev() {
            let (entity, data) = self.interior[i];
            self.notable.retain(|(e, _)| *e != entity);
            let Some(p) = pos(entity, &data) else {
                self.interior.remove(i);
                continue;
            };
            if p.distance(center) >= threshold {
                self.interior.remove(i);
                departures.push((entity, data));
            }
        }
        for i in (0..self.notable.len()).rev() {
            let (entity, data) = self.notable[i];
            let Some(p) = pos(entity, &data) else {
                self.notable.remove(i);
                continue;
            };
            if p.distance(center) < threshold {
                self.notable.remove(i);
                self.interior.push((entity, data));
            }
        }
        departures
    }
}

/// Teleporting half of a spherical portal.
#[derive(Debug, Component)]
pub struct SphereTeleporter {
    /// The partner teleporter; a non-owning back-reference.
    pub linked: Option<Entity>,
    /// Radius of the sensor sphere before transform scale.
    pub collider_radius: f32,
    /// Names that never teleport.
    pub no_teleport: Vec<String>,
    pub membership: SphereMembership,
}

impl Default for SphereTeleporter {
    fn default() -> Self {
        SphereTeleporter {
            linked: None,
            collider_radius: 1.,
            no_teleport: Vec::new(),
            membership: SphereMembership::default(),
        }
    }
}

/// Effective exit radius: the smallest scale axis times the collider
/// radius, pulled in by the margin.
pub fn exit_threshold(scale: Vec3, collider_radius: f32) -> f32 {
    scale.min_element() * collider_radius - RADIUS_MARGIN
}

/// Where a departing body lands: the frame remap of its reference point
/// plus the radial push, corrected back to the body's own origin.
pub fn sphere_exit_position(
    portal: &Transform,
    partner: &Transform,
    current_ref: Vec3,
    pivot_offset: Vec3,
) -> Vec3 {
    let mut new_pos = remap_point(portal, partner, current_ref);
    if let Some(dir) = (current_ref - portal.translation).try_normalize() {
        new_pos += dir * RADIAL_PUSH;
    }
    new_pos + pivot_offset
}

/// Register bodies entering a spherical portal's trigger and forget bodies
/// leaving it.
pub fn track_sphere_membership(
    mut collisions: EventReader<CollisionEvent>,
    mut teleporters: Query<&mut SphereTeleporter>,
    names: Query<&Name>,
    cameras: Query<(), With<Camera>>,
    controllers: Query<(), With<FirstPersonController>>,
    children: Query<&Children>,
) {
    for collision in collisions.iter() {
        let (started, a, b) = match collision {
            CollisionEvent::Started(a, b, _) => (true, *a, *b),
            CollisionEvent::Stopped(a, b, _) => (false, *a, *b),
        };
        for (portal_entity, body) in [(a, b), (b, a)] {
            let Ok(mut teleporter) = teleporters.get_mut(portal_entity) else { continue };
            if !started {
                teleporter.membership.forget(body);
                continue;
            }
            if let Ok(name) = names.get(body) {
                if teleporter.no_teleport.iter().any(|t| t == name.as_str()) {
                    continue;
                }
            }
            let camera = find_in_hierarchy(body, &children, |e| cameras.get(e).is_ok());
            let controller = find_in_hierarchy(body, &children, |e| controllers.get(e).is_ok());
            teleporter.membership.note(
                body,
                SphereTracked {
                    reference: camera.map_or(ReferencePoint::Own, ReferencePoint::Camera),
                    controller,
                },
            );
        }
    }
}

/// Fixed-step confirmation and exit detection for every spherical portal.
pub fn step_sphere_portals(
    mut portals: Query<(Entity, &mut SphereTeleporter, &GlobalTransform)>,
    transforms: Query<&GlobalTransform>,
    mut bodies: Query<&mut Transform>,
    mut controllers: Query<&mut FirstPersonController>,
) {
    let linked_portals = portals
        .iter()
        .filter_map(|(entity, teleporter, gtrf)| {
            let partner = teleporter.linked?;
            let (_, _, partner_gtrf) = portals.get(partner).ok()?;
            let portal_trf = gtrf.compute_transform();
            Some((
                entity,
                portal_trf,
                partner_gtrf.compute_transform(),
                exit_threshold(portal_trf.scale, teleporter.collider_radius),
            ))
        })
        .collect::<Vec<_>>();

    for (portal_entity, portal_trf, partner_trf, threshold) in linked_portals {
        let Ok((_, mut teleporter, _)) = portals.get_mut(portal_entity) else { continue };
        let departures = teleporter.membership.step(
            threshold,
            portal_trf.translation,
            |entity, data| {
                let reference_entity = match data.reference {
                    ReferencePoint::Camera(camera) => camera,
                    ReferencePoint::Own => entity,
                };
                transforms.get(reference_entity).ok().map(|t| t.translation())
            },
        );
        for (body, data) in departures {
            let reference_entity = match data.reference {
                ReferencePoint::Camera(camera) => camera,
                ReferencePoint::Own => body,
            };
            let Ok(current) = transforms.get(reference_entity) else { continue };
            let current = current.translation();
            let pivot_offset = match data.reference {
                ReferencePoint::Camera(_) => transforms
                    .get(body)
                    .map(|t| t.translation())
                    .unwrap_or(current)
                    - current,
                ReferencePoint::Own => Vec3::ZERO,
            };
            if let Some(controller_entity) = data.controller {
                if let Ok(mut controller) = controllers.get_mut(controller_entity) {
                    controller.dimension = !controller.dimension;
                }
            }
            if let Ok(mut transform) = bodies.get_mut(body) {
                transform.translation =
                    sphere_exit_position(&portal_trf, &partner_trf, current, pivot_offset);
                info!("Teleported {:?} through sphere portal {:?}", body, portal_entity);
            }
        }
    }
}

/// Null teleporter links pointing at despawned partners.
pub fn unlink_dead_sphere_teleporters(mut teleporters: Query<(Entity, &mut SphereTeleporter)>) {
    let live = teleporters.iter().map(|(e, _)| e).collect::<Vec<_>>();
    for (entity, mut teleporter) in &mut teleporters {
        if let Some(partner) = teleporter.linked {
            if !live.contains(&partner) {
                info!(
                    "Sphere teleporter {:?} lost its partner {:?}",
                    entity, partner
                );
                teleporter.linked = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::utils::HashMap;

    fn tracked() -> SphereTracked {
        SphereTracked {
            reference: ReferencePoint::Own,
            controller: None,
        }
    }

    fn at(distance: f32) -> Vec3 {
        Vec3::new(distance, 0., 0.)
    }

    #[test]
    fn threshold_uses_the_smallest_scale_axis() {
        assert!((exit_threshold(Vec3::new(2., 3., 4.), 0.5) - 0.95).abs() < 1e-6);
        assert!((exit_threshold(Vec3::ONE, 1.05) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn promote_then_teleport_on_exit() {
        let entity = Entity::from_raw(1);
        let mut membership = SphereMembership::default();
        let mut positions = HashMap::new();

        // Outside the radius: noted, nothing happens.
        membership.note(entity, tracked());
        positions.insert(entity, at(1.2));
        let out = membership.step(1., Vec3::ZERO, |e, _| positions.get(&e).copied());
        assert!(out.is_empty());
        assert!(membership.contains(entity));

        // Inside: confirmed interior, still no teleport.
        positions.insert(entity, at(0.8));
        let out = membership.step(1., Vec3::ZERO, |e, _| positions.get(&e).copied());
        assert!(out.is_empty());

        // Back at the radius: teleports exactly once and leaves tracking.
        positions.insert(entity, at(1.1));
        let out = membership.step(1., Vec3::ZERO, |e, _| positions.get(&e).copied());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, entity);
        assert!(!membership.contains(entity));

        let out = membership.step(1., Vec3::ZERO, |e, _| positions.get(&e).copied());
        assert!(out.is_empty());
    }

    #[test]
    fn arrivals_never_fire_on_the_same_step() {
        // A body arriving outside the destination threshold is only ever
        // notable there; satisfying the exit condition alone cannot fire.
        let entity = Entity::from_raw(7);
        let mut membership = SphereMembership::default();
        membership.note(entity, tracked());
        let out = membership.step(1., Vec3::ZERO, |_, _| Some(at(1.1)));
        assert!(out.is_empty());
        assert!(membership.contains(entity));
    }

    #[test]
    fn membership_sets_stay_disjoint() {
        let entity = Entity::from_raw(3);
        let mut membership = SphereMembership::default();
        membership.note(entity, tracked());
        membership.note(entity, tracked());
        // Promote, then note again while interior: still tracked once.
        let _ = membership.step(1., Vec3::ZERO, |_, _| Some(at(0.5)));
        membership.note(entity, tracked());
        let out = membership.step(1., Vec3::ZERO, |_, _| Some(at(2.)));
        assert_eq!(out.len(), 1);
        assert!(!membership.contains(entity));
    }

    #[test]
    fn simultaneous_departures_are_not_skipped() {
        let mut membership = SphereMembership::default();
        let entities = [1, 2, 3].map(Entity::from_raw);
        for entity in entities {
            membership.note(entity, tracked());
        }
        let _ = membership.step(1., Vec3::ZERO, |_, _| Some(at(0.1)));
        // All three leave on the same step; index-unsafe removal would skip
        // every other element.
        let out = membership.step(1., Vec3::ZERO, |_, _| Some(at(5.)));
        assert_eq!(out.len(), 3);
        for entity in entities {
            assert!(!membership.contains(entity));
        }
    }

    #[test]
    fn exit_position_gets_the_radial_push() {
        let portal = Transform::from_xyz(0., 0., 0.);
        let partner = Transform::from_xyz(10., 0., 0.);
        let pos = sphere_exit_position(&portal, &partner, Vec3::new(0., 0., 1.2), Vec3::ZERO);
        assert!((pos - Vec3::new(10., 0., 1.4)).length() < 1e-4);
    }
}

//! Twin entities pinned across the two world layers.

use bevy::prelude::*;

/// Keeps this entity at a fixed offset from a leader, matching its
/// rotation. Handy for props that must exist in the same relative spot in
/// both layers.
#[derive(Debug, Component)]
pub struct DimensionTwin {
    pub leader: Entity,
    pub offset: Vec3,
}

pub fn follow_dimension_twins(
    leaders: Query<&GlobalTransform, Without<DimensionTwin>>,
    mut twins: Query<(&DimensionTwin, &mut Transform)>,
) {
    for (twin, mut transform) in &mut twins {
        let Ok(leader) = leaders.get(twin.leader) else { continue };
        let leader = leader.compute_transform();
        transform.translation = leader.translation + twin.offset;
        transform.rotation = leader.rotation;
    }
}

//! Open/close/idle portal scale animation.
//!
//! Purely cosmetic: portals grow in when a pair opens, pulse gently while
//! idle, and shrink away on close. Close completion despawns both linked
//! members, which is the lifecycle boundary the render and teleport cores
//! observe.

use bevy::prelude::*;
use noise::{NoiseFn, Perlin};

const OPEN_TIME: f32 = 0.6;
const CLOSE_TIME: f32 = 0.4;
const CLOSED_SCALE: Vec3 = Vec3::splat(0.1);
const PULSE_AMPLITUDE: f32 = 0.06;
const PULSE_FREQUENCY: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaverState {
    Opening,
    Idle,
    Closing,
}

/// Drives one portal pair's scale. Lives on the first member; the linked
/// member mirrors the leader's scale every frame.
#[derive(Debug, Component)]
pub struct Waver {
    pub linked: Option<Entity>,
    base_scale: Vec3,
    state: WaverState,
    elapsed: f32,
    close_from: Vec3,
    close_captured: bool,
}

impl Waver {
    pub fn opening(base_scale: Vec3, linked: Option<Entity>) -> Self {
        Waver {
            linked,
            base_scale,
            state: WaverState::Opening,
            elapsed: 0.,
            close_from: base_scale,
            close_captured: false,
        }
    }

    /// Retarget to the closed scale; both members despawn once it is
    /// reached.
    pub fn close(&mut self) {
        if self.state != WaverState::Closing {
            self.state = WaverState::Closing;
            self.elapsed = 0.;
        }
    }

    pub fn is_closing(&self) -> bool {
        self.state == WaverState::Closing
    }

    /// Scale for the current state; `t` is global time feeding the idle
    /// pulse.
    fn scale(&self, t: f64, perlin: &Perlin) -> Vec3 {
        match self.state {
            WaverState::Opening => {
                CLOSED_SCALE.lerp(self.base_scale, (self.elapsed / OPEN_TIME).min(1.))
            }
            WaverState::Idle => {
                let pulse = |axis: f64| {
                    1. + PULSE_AMPLITUDE * perlin.get([t * PULSE_FREQUENCY, axis]) as f32
                };
                Vec3::new(
                    self.base_scale.x * pulse(0.),
                    self.base_scale.y * pulse(13.7),
                    self.base_scale.z * pulse(27.3),
                )
            }
            WaverState::Closing => {
                self.close_from
                    .lerp(CLOSED_SCALE, (self.elapsed / CLOSE_TIME).min(1.))
            }
        }
    }
}

pub fn animate_wavers(
    mut commands: Commands,
    time: Res<Time>,
    mut perlin: Local<Option<Perlin>>,
    mut wavers: Query<(Entity, &mut Waver, &mut Transform)>,
    mut linked_transforms: Query<&mut Transform, Without<Waver>>,
) {
    let perlin = perlin.get_or_insert_with(|| Perlin::new(7));
    for (entity, mut waver, mut transform) in &mut wavers {
        waver.elapsed += time.delta_seconds();

        match waver.state {
            WaverState::Opening if waver.elapsed >= OPEN_TIME => {
                waver.state = WaverState::Idle;
                waver.elapsed = 0.;
            }
            WaverState::Closing if waver.elapsed >= CLOSE_TIME => {
                if let Some(linked) = waver.linked {
                    if linked_transforms.get(linked).is_ok() {
                        commands.entity(linked).despawn_recursive();
                    }
                }
                commands.entity(entity).despawn_recursive();
                debug!("Portal pair fully closed");
                continue;
            }
            _ => {}
        }
        if waver.state == WaverState::Closing && !waver.close_captured {
            waver.close_from = transform.scale;
            waver.close_captured = true;
        }

        let scale = waver.scale(time.elapsed_seconds_f64(), perlin);
        transform.scale = scale;
        if let Some(linked) = waver.linked {
            if let Ok(mut linked_transform) = linked_transforms.get_mut(linked) {
                linked_transform.scale = scale;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_interpolates_from_closed_to_base() {
        let perlin = Perlin::new(7);
        let mut waver = Waver::opening(Vec3::splat(2.), None);
        assert!((waver.scale(0., &perlin) - CLOSED_SCALE).length() < 1e-5);
        waver.elapsed = OPEN_TIME;
        assert!((waver.scale(0., &perlin) - Vec3::splat(2.)).length() < 1e-5);
    }

    #[test]
    fn closing_reaches_the_closed_scale() {
        let perlin = Perlin::new(7);
        let mut waver = Waver::opening(Vec3::splat(2.), None);
        waver.close();
        assert!(waver.is_closing());
        waver.elapsed = CLOSE_TIME;
        assert!((waver.scale(0., &perlin) - CLOSED_SCALE).length() < 1e-5);
    }

    #[test]
    fn idle_pulse_stays_near_the_base_scale() {
        let perlin = Perlin::new(7);
        let mut waver = Waver::opening(Vec3::ONE, None);
        waver.state = WaverState::Idle;
        for i in 0..32 {
            let scale = waver.scale(i as f64 * 0.25, &perlin);
            for axis in [scale.x, scale.y, scale.z] {
                assert!((axis - 1.).abs() <= PULSE_AMPLITUDE + 1e-4);
            }
        }
    }
}

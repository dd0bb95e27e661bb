#![allow(clippy::type_complexity)]

use bevy::prelude::*;

mod plugins;
mod util;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            window: WindowDescriptor {
                title: "Riftgate Prototype".to_string(),
                width: 1280.,
                height: 720.,
                ..Default::default()
            },
            ..Default::default()
        }))
        .add_plugin(plugins::game::GamePlugin)
        .run();
}

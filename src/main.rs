use bevy::prelude::*;

use terrain_drape::DrapePlugin;

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins.set(WindowPlugin {
                primary_window: Some(Window {
                    title: "Terrain Drape".to_string(),
                    resolution: (1280, 720).into(),
                    ..default()
                }),
                ..default()
            }),
            DrapePlugin,
        ))
        .run();
}

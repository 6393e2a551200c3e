//! Bevy host for an import: textured terrain plus sliced layer meshes.

use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;

use crate::bounds::BoundingBox;
use crate::config::{load_config, DrapeConfig};
use crate::geo::TransverseMercator;
use crate::importer::{http_fetcher, import_layer, import_overlay, measure_terrain, scene_bounds};
use crate::layer::{extruded_footprint, flat_footprint, DrapeStep, LayerSettings};
use crate::terrain::{height_field_mesh, Terrain};

pub struct DrapePlugin;

impl Plugin for DrapePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(load_config())
            .add_systems(Startup, setup_scene);
    }
}

/// Root of the imported scene. Rotates the Z-up import frame into Bevy's Y-up.
#[derive(Component)]
pub struct SceneRoot;

#[derive(Component)]
pub struct TerrainSurface;

/// Hidden copy of the terrain envelope, the Boolean operand of every layer.
#[derive(Component)]
pub struct TerrainEnvelopeMesh;

/// Drape steps still to be applied to a layer mesh.
#[derive(Component, Debug, Clone)]
pub struct DrapeModifiers {
    pub steps: Vec<DrapeStep>,
    /// Mesh asset of the Boolean operand, if the steps include one
    pub envelope: Option<Handle<Mesh>>,
}

/// Footprints of the demo layers, as (min x, min y, max x, max y, height)
/// in meters around the scene origin.
const DEMO_BUILDINGS: [(f64, f64, f64, f64, f32); 5] = [
    (-120.0, -80.0, -60.0, -30.0, 18.0),
    (-20.0, -20.0, 25.0, 15.0, 42.0),
    (60.0, 40.0, 140.0, 70.0, 12.0),
    (30.0, -150.0, 55.0, -90.0, 25.0),
    (-260.0, 120.0, -180.0, 230.0, 9.0),
];

const DEMO_WATER: (f64, f64, f64, f64) = (150.0, -300.0, 420.0, -120.0);

fn setup_scene(
    mut commands: Commands,
    config: Res<DrapeConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut images: ResMut<Assets<Image>>,
) {
    let root = commands
        .spawn((
            Name::new("Imported Scene"),
            SceneRoot,
            Transform::from_rotation(Quat::from_rotation_x(-FRAC_PI_2)),
            Visibility::default(),
        ))
        .id();

    let view_distance = spawn_import(&mut commands, root, &config, &mut meshes, &mut materials, &mut images)
        .unwrap_or(1000.0);

    commands.spawn((
        Name::new("Camera"),
        Camera3d::default(),
        Transform::from_xyz(0.0, view_distance * 0.6, view_distance).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.spawn((
        Name::new("Sun"),
        DirectionalLight {
            illuminance: 10_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(400.0, 800.0, 300.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

/// Runs the import and spawns its results under `root`. Returns a camera
/// distance that frames the terrain, or `None` if nothing was imported.
fn spawn_import(
    commands: &mut Commands,
    root: Entity,
    config: &DrapeConfig,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    images: &mut Assets<Image>,
) -> Option<f32> {
    if let Err(e) = config.validate() {
        error!("Invalid configuration, nothing to import: {}", e);
        return None;
    }
    let geo_bounds = config.geo_bounds().ok()?;
    let projection = TransverseMercator::new(config.origin());
    let bounds = scene_bounds(&geo_bounds, &projection);
    let relief = config.terrain.relief;
    let mut terrain_mesh = height_field_mesh(&bounds, config.terrain.resolution, |x, y| {
        relief * 0.5 * (1.0 + ((x / 180.0).sin() * (y / 260.0).cos()) as f32)
    });

    let overlay = http_fetcher(config).and_then(|mut fetcher| {
        import_overlay(config, &mut terrain_mesh, &Transform::IDENTITY, &projection, &mut fetcher)
    });
    let terrain_material = match overlay {
        Ok(import) => {
            info!(
                "Overlay zoom {}: {}x{} pixels",
                import.grid.zoom, import.image.width, import.image.height
            );
            StandardMaterial {
                base_color_texture: Some(images.add(import.image.to_image())),
                perceptual_roughness: 1.0,
                ..default()
            }
        }
        Err(e) => {
            warn!("Overlay import failed, terrain stays untextured: {}", e);
            StandardMaterial {
                base_color: Color::srgb(0.35, 0.45, 0.3),
                perceptual_roughness: 1.0,
                ..default()
            }
        }
    };

    let mut terrain = match measure_terrain(&terrain_mesh, &Transform::IDENTITY, config) {
        Ok(terrain) => terrain,
        Err(e) => {
            error!("Terrain import failed: {}", e);
            return None;
        }
    };
    commands.spawn((
        Name::new("Terrain"),
        TerrainSurface,
        Mesh3d(meshes.add(terrain_mesh)),
        MeshMaterial3d(materials.add(terrain_material)),
        Transform::IDENTITY,
        ChildOf(root),
    ));

    let settings = config.layer_settings();
    let mut envelope = None;
    let building_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.8, 0.78, 0.72),
        ..default()
    });
    for (i, &(x0, y0, x1, y1, height)) in DEMO_BUILDINGS.iter().enumerate() {
        let mesh = extruded_footprint(&BoundingBox::new(x0, y0, x1, y1), height);
        spawn_layer(
            commands,
            root,
            ("buildings", i),
            mesh,
            &mut terrain,
            &settings,
            meshes,
            &mut envelope,
            building_material.clone(),
        );
    }

    let water_material = materials.add(StandardMaterial {
        base_color: Color::srgba(0.2, 0.4, 0.8, 0.8),
        alpha_mode: AlphaMode::Blend,
        ..default()
    });
    let (x0, y0, x1, y1) = DEMO_WATER;
    let water = flat_footprint(&BoundingBox::new(x0, y0, x1, y1), 0.0);
    spawn_layer(
        commands,
        root,
        ("water", 0),
        water,
        &mut terrain,
        &settings,
        meshes,
        &mut envelope,
        water_material,
    );

    if let Some(handle) = envelope {
        commands.spawn((
            Name::new("Terrain Envelope"),
            TerrainEnvelopeMesh,
            Mesh3d(handle),
            Transform::IDENTITY,
            Visibility::Hidden,
            ChildOf(root),
        ));
    }

    Some(bounds.width(crate::Axis::X).max(bounds.width(crate::Axis::Y)) as f32)
}

#[allow(clippy::too_many_arguments)]
fn spawn_layer(
    commands: &mut Commands,
    root: Entity,
    (layer_id, index): (&str, usize),
    mut mesh: Mesh,
    terrain: &mut Terrain,
    settings: &LayerSettings,
    meshes: &mut Assets<Mesh>,
    envelope_asset: &mut Option<Handle<Mesh>>,
    material: Handle<StandardMaterial>,
) {
    let import = match import_layer(layer_id, &mut mesh, Some(terrain), settings) {
        Ok(import) => import,
        Err(e) => {
            warn!("Skipping {} #{}: {}", layer_id, index, e);
            return;
        }
    };
    if import.outcome.steps.is_empty() {
        return;
    }
    let operand = import.outcome.steps.iter().find_map(|step| match step {
        DrapeStep::Boolean { envelope } => Some(*envelope),
        DrapeStep::Shrinkwrap { .. } => None,
    });
    let envelope = operand.map(|operand| {
        envelope_asset
            .get_or_insert_with(|| meshes.add(operand.mesh()))
            .clone()
    });
    commands.spawn((
        Name::new(format!("{} #{}", layer_id, index)),
        DrapeModifiers {
            steps: import.outcome.steps,
            envelope,
        },
        Mesh3d(meshes.add(mesh)),
        MeshMaterial3d(material),
        Transform::from_translation(import.placement.location),
        ChildOf(root),
    ));
}

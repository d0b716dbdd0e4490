//! Adapts avatar assets to the naming conventions of the avatar SDK: the root
//! object becomes the armature, the armature loses its transform, and facial
//! shape keys get viseme names.

use std::path::Path;

use anyhow::Result;
use log::{info, warn};

use crate::{
    conversion::{Asset, Exporter, Importer, Scene},
    format::{GltfExporter, GltfImporter},
};

/// The name of the avatar root object in source assets.
pub const ROOT_NAME: &str = "AvatarRoot";

/// The name the SDK expects for the avatar root object.
pub const ARMATURE_NAME: &str = "Armature";

/// Shape key names of source assets and the viseme names the SDK expects.
pub const SHAPE_KEY_MAP: [(&str, &str); 15] = [
    ("sil", "viseme_sil"),
    ("PP", "viseme_PP"),
    ("FF", "viseme_FF"),
    ("TH", "viseme_TH"),
    ("DD", "viseme_DD"),
    ("kk", "viseme_kk"),
    ("CH", "viseme_CH"),
    ("SS", "viseme_SS"),
    ("nn", "viseme_nn"),
    ("RR", "viseme_RR"),
    ("aa", "viseme_aa"),
    ("E", "viseme_E"),
    ("ih", "viseme_I"),
    ("oh", "viseme_O"),
    ("ou", "viseme_U"),
];

/// What [`adapt`] does to a scene.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptOptions {
    /// The object renamed to `armature_name`.
    pub root_name: String,
    /// The object whose transforms are applied.
    pub armature_name: String,
    /// Pairs of (source, target) shape key names, applied in order.
    pub shape_key_map: Vec<(String, String)>,
    pub apply_transforms: bool,
}

impl Default for AdaptOptions {
    fn default() -> Self {
        Self {
            root_name: ROOT_NAME.to_string(),
            armature_name: ARMATURE_NAME.to_string(),
            shape_key_map: SHAPE_KEY_MAP
                .iter()
                .map(|&(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            apply_transforms: true,
        }
    }
}

/// A renamed shape key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeKeyRename {
    pub mesh: usize,
    pub from: String,
    pub to: String,
}

/// The outcome of [`adapt`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// The new name of the root object, if there was one.
    pub root_renamed: Option<String>,
    pub transforms_applied: bool,
    pub shape_keys: Vec<ShapeKeyRename>,
}

impl Report {
    pub fn shape_keys_processed(&self) -> usize {
        self.shape_keys.len()
    }
}

/// Reads the asset at `path` into the scene, replacing its contents.
pub fn import(path: &Path, scene: &mut Scene) -> Result<()> {
    let asset = Asset::from_path(path)?;
    let importer = GltfImporter::default();
    if !importer.supports(&asset) {
        warn!(
            "\"{}\" does not have a glTF extension, reading it as glTF anyway",
            path.display()
        );
    }

    importer.import(&asset, scene)
}

/// Writes the scene to `path` as GLB, replacing any existing file.
pub fn export(scene: &Scene, path: &Path) -> Result<()> {
    GltfExporter::default().export(scene, path)?.write()
}

/// Runs every adaptation step on the scene. Each step is skipped when the
/// object it works on is missing.
pub fn adapt(scene: &mut Scene, options: &AdaptOptions) -> Report {
    let root_renamed = rename_root(scene, &options.root_name, &options.armature_name);
    let transforms_applied =
        options.apply_transforms && normalize_armature(scene, &options.armature_name);
    let shape_keys = rename_shape_keys(scene, &options.shape_key_map);
    info!("Processed {} shape keys", shape_keys.len());

    Report {
        root_renamed,
        transforms_applied,
        shape_keys,
    }
}

/// Renames the first object called `root_name` to `armature_name`. Returns the
/// name the object ended up with.
pub fn rename_root(scene: &mut Scene, root_name: &str, armature_name: &str) -> Option<String> {
    let object = scene.find_object(root_name)?;
    let name = scene.rename_object(object, armature_name);
    info!("Renamed {} to {}", root_name, name);

    Some(name)
}

/// Applies the transforms of the first object called `armature_name`.
/// Returns whether the object was found and its transforms applied.
pub fn normalize_armature(scene: &mut Scene, armature_name: &str) -> bool {
    let Some(object) = scene.find_object(armature_name) else {
        return false;
    };

    match scene.apply_transforms(object) {
        Ok(_) => {
            info!("Applied transforms to {}", armature_name);
            true
        }
        Err(err) => {
            warn!("Failed to apply the transforms of {}: {:#}", armature_name, err);
            false
        }
    }
}

/// Visits every root object and its descendants and renames the shape keys of
/// their meshes according to `map`. For each pair only the first matching
/// shape key of a mesh is renamed.
pub fn rename_shape_keys(scene: &mut Scene, map: &[(String, String)]) -> Vec<ShapeKeyRename> {
    let objects: Vec<usize> = scene
        .root_objects()
        .into_iter()
        .flat_map(|root| scene.traverse(root).collect::<Vec<_>>())
        .collect();

    let mut renames = Vec::new();
    for object in objects {
        let Some(mesh) = scene.object_mesh(object) else {
            continue;
        };

        for (from, to) in map {
            match scene.rename_shape_key(mesh, from, to) {
                Ok(Some(name)) => {
                    info!("Renamed shape key: {} -> {}", from, name);
                    renames.push(ShapeKeyRename {
                        mesh,
                        from: from.clone(),
                        to: name,
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("Skipped the shape keys of mesh {}: {:#}", mesh, err);
                    break;
                }
            }
        }
    }

    renames
}

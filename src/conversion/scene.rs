use std::collections::HashSet;

use anyhow::{anyhow, bail, Result};
use glam::{Mat4, Quat, Vec3};
use gltf::json::{self, scene::UnitQuaternion};
use serde_json::{value::to_raw_value, Map, Value};

/// The mesh extras key listing the names of a mesh's morph targets.
const TARGET_NAMES: &str = "targetNames";

const EPSILON: f32 = 1e-6;

/// Represents a 3D scene loaded from an asset: the glTF document and the
/// single binary buffer every buffer view points into.
///
/// Objects are the document's nodes and are addressed by node index.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub document: json::Root,
    pub blob: Vec<u8>,
}

impl Scene {
    pub fn new(document: json::Root, blob: Vec<u8>) -> Self {
        Self { document, blob }
    }

    /// Removes every object and all data from the scene.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.document.nodes.is_empty() && self.document.meshes.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.document.nodes.len()
    }

    /// Returns the first object with the given name.
    pub fn find_object(&self, name: &str) -> Option<usize> {
        self.document
            .nodes
            .iter()
            .position(|node| node.name.as_deref() == Some(name))
    }

    pub fn object_name(&self, object: usize) -> Option<&str> {
        self.document
            .nodes
            .get(object)
            .and_then(|node| node.name.as_deref())
    }

    /// Renames an object and returns the name it ended up with. Names stay
    /// unique: if another object already uses `name`, the first free numbered
    /// variant ("Armature.001", "Armature.002", ...) is used instead.
    pub fn rename_object(&mut self, object: usize, name: &str) -> String {
        let unique = unique_name(name, |candidate| {
            self.document
                .nodes
                .iter()
                .enumerate()
                .any(|(index, node)| index != object && node.name.as_deref() == Some(candidate))
        });

        if let Some(node) = self.document.nodes.get_mut(object) {
            node.name = Some(unique.clone());
        }
        unique
    }

    pub fn children(&self, object: usize) -> Vec<usize> {
        self.document
            .nodes
            .get(object)
            .and_then(|node| node.children.as_ref())
            .map(|children| children.iter().map(|child| child.value()).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, object: usize) -> Option<usize> {
        self.document.nodes.iter().position(|node| {
            node.children
                .iter()
                .flatten()
                .any(|child| child.value() == object)
        })
    }

    /// Returns the objects that are no other object's child, in index order.
    pub fn root_objects(&self) -> Vec<usize> {
        let children: HashSet<usize> = self
            .document
            .nodes
            .iter()
            .flat_map(|node| node.children.iter().flatten())
            .map(|child| child.value())
            .collect();

        (0..self.document.nodes.len())
            .filter(|index| !children.contains(index))
            .collect()
    }

    /// Iterates over an object and all its descendants, depth-first, parents
    /// before children.
    pub fn traverse(&self, object: usize) -> Traverse<'_> {
        Traverse {
            scene: self,
            stack: vec![object],
            visited: HashSet::new(),
        }
    }

    /// Returns the index of the mesh attached to an object.
    pub fn object_mesh(&self, object: usize) -> Option<usize> {
        self.document
            .nodes
            .get(object)
            .and_then(|node| node.mesh)
            .map(|mesh| mesh.value())
    }

    /// Returns the transform of an object relative to its parent.
    pub fn local_matrix(&self, object: usize) -> Option<Mat4> {
        let node = self.document.nodes.get(object)?;
        if let Some(matrix) = node.matrix {
            return Some(Mat4::from_cols_array(&matrix));
        }

        let translation = node.translation.map(Vec3::from).unwrap_or(Vec3::ZERO);
        let rotation = node
            .rotation
            .map(|rotation| Quat::from_array(rotation.0))
            .unwrap_or(Quat::IDENTITY);
        let scale = node.scale.map(Vec3::from).unwrap_or(Vec3::ONE);

        Some(Mat4::from_scale_rotation_translation(
            scale,
            rotation,
            translation,
        ))
    }

    /// Sets the transform of an object relative to its parent. Objects that
    /// store a matrix keep doing so, other objects get their translation,
    /// rotation and scale decomposed from `matrix`.
    pub fn set_local_matrix(&mut self, object: usize, matrix: Mat4) {
        let Some(node) = self.document.nodes.get_mut(object) else {
            return;
        };

        if node.matrix.is_some() {
            node.matrix = Some(matrix.to_cols_array());
            return;
        }

        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        node.translation =
            (!translation.abs_diff_eq(Vec3::ZERO, EPSILON)).then(|| translation.to_array());
        node.rotation = (!rotation.abs_diff_eq(Quat::IDENTITY, EPSILON))
            .then(|| UnitQuaternion(rotation.normalize().to_array()));
        node.scale = (!scale.abs_diff_eq(Vec3::ONE, EPSILON)).then(|| scale.to_array());
    }

    /// Resets the transform of an object to identity.
    pub fn reset_transform(&mut self, object: usize) {
        if let Some(node) = self.document.nodes.get_mut(object) {
            node.matrix = None;
            node.translation = None;
            node.rotation = None;
            node.scale = None;
        }
    }

    /// Returns the shape key names of a mesh, in morph target order. Names
    /// that are not strings read as empty.
    pub fn shape_keys(&self, mesh: usize) -> Vec<String> {
        self.target_names(mesh)
            .unwrap_or_default()
            .iter()
            .map(|name| name.as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Replaces the shape key names of a mesh, keeping its other extras.
    pub fn set_shape_keys(&mut self, mesh: usize, names: &[String]) -> Result<()> {
        let names = names.iter().cloned().map(Value::String).collect();
        self.set_target_names(mesh, names)
    }

    /// Renames the first shape key of a mesh called `from`, keeping shape key
    /// names unique within the mesh like [`Scene::rename_object`] does for
    /// objects. Returns the new name, or `None` if the mesh has no such key.
    pub fn rename_shape_key(
        &mut self,
        mesh: usize,
        from: &str,
        to: &str,
    ) -> Result<Option<String>> {
        let mut names = self.target_names(mesh)?;
        let Some(position) = names.iter().position(|name| name.as_str() == Some(from)) else {
            return Ok(None);
        };

        let unique = unique_name(to, |candidate| {
            names
                .iter()
                .enumerate()
                .any(|(index, name)| index != position && name.as_str() == Some(candidate))
        });
        names[position] = Value::String(unique.clone());
        self.set_target_names(mesh, names)?;

        Ok(Some(unique))
    }

    /// Applies the transform of an object to its data and children, leaving
    /// the object with an identity transform. Returns whether anything changed.
    pub fn apply_transforms(&mut self, object: usize) -> Result<bool> {
        super::bake::apply_transforms(self, object)
    }

    /// The raw `targetNames` entries of a mesh.
    fn target_names(&self, mesh: usize) -> Result<Vec<Value>> {
        Ok(match self.mesh_extras(mesh)? {
            Some(Value::Object(mut extras)) => match extras.remove(TARGET_NAMES) {
                Some(Value::Array(names)) => names,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        })
    }

    fn set_target_names(&mut self, mesh: usize, names: Vec<Value>) -> Result<()> {
        let mut extras = match self.mesh_extras(mesh)? {
            Some(Value::Object(extras)) => extras,
            Some(_) => bail!("The extras of mesh {} are not an object", mesh),
            None => Map::new(),
        };
        extras.insert(TARGET_NAMES.to_string(), Value::Array(names));

        let raw = to_raw_value(&Value::Object(extras))?;
        if let Some(mesh) = self.document.meshes.get_mut(mesh) {
            mesh.extras = Some(raw);
        }
        Ok(())
    }

    fn mesh_extras(&self, mesh: usize) -> Result<Option<Value>> {
        let mesh = self
            .document
            .meshes
            .get(mesh)
            .ok_or_else(|| anyhow!("Mesh {} does not exist", mesh))?;

        Ok(match &mesh.extras {
            Some(raw) => Some(serde_json::from_str(raw.get())?),
            None => None,
        })
    }
}

/// Returns `name`, or its first numbered variant ("name.001", "name.002", ...)
/// that is not taken.
fn unique_name(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut unique = name.to_string();
    let mut suffix = 0;
    while taken(&unique) {
        suffix += 1;
        unique = format!("{}.{:03}", name, suffix);
    }
    unique
}

/// Depth-first iterator over an object and its descendants.
pub struct Traverse<'a> {
    scene: &'a Scene,
    stack: Vec<usize>,
    visited: HashSet<usize>,
}

impl Iterator for Traverse<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while let Some(object) = self.stack.pop() {
            if object >= self.scene.object_count() || !self.visited.insert(object) {
                continue;
            }

            self.stack
                .extend(self.scene.children(object).into_iter().rev());
            return Some(object);
        }

        None
    }
}

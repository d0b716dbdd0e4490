use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use glam::{Mat3, Mat4, Quat, Vec3, Vec4};
use gltf::json::{
    self,
    accessor::Type,
    animation::{Interpolation, Property},
    buffer::Target,
    mesh::{Mode, Semantic},
    validation::Checked,
};
use log::{debug, warn};

use super::{
    accessor::{push_f32, push_indices, read_f32, read_indices},
    Scene,
};

const EPSILON: f32 = 1e-6;

/// The kinds of data an object transform is baked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Position,
    Normal,
    Tangent,
    PositionDelta,
    NormalDelta,
    TangentDelta,
    Indices,
}

/// The linear maps derived from the transform being applied.
struct Bake {
    matrix: Mat4,
    linear: Mat3,
    normal: Mat3,
    rotation: Quat,
    scale: Vec3,
    /// Whether the transform mirrors geometry.
    flip: bool,
}

impl Bake {
    fn new(matrix: Mat4) -> Self {
        let linear = Mat3::from_mat4(matrix);
        let (scale, rotation, _) = matrix.to_scale_rotation_translation();
        Self {
            matrix,
            linear,
            normal: linear.inverse().transpose(),
            rotation,
            scale,
            flip: linear.determinant() < 0.,
        }
    }

    fn vec3(&self, kind: Kind, value: [f32; 3]) -> [f32; 3] {
        let value = Vec3::from(value);
        let result = match kind {
            Kind::Position => self.matrix.transform_point3(value),
            Kind::Normal => (self.normal * value).normalize_or_zero(),
            Kind::NormalDelta => self.normal * value,
            _ => self.linear * value,
        };
        result.to_array()
    }

    fn tangent(&self, value: [f32; 4]) -> [f32; 4] {
        let tangent = Vec4::from(value);
        let xyz = (self.linear * tangent.truncate()).normalize_or_zero();
        let w = if self.flip { -tangent.w } else { tangent.w };
        xyz.extend(w).to_array()
    }
}

/// Applies the local transform of an object: its mesh data, its children and
/// the animations of its children absorb the transform, and the object is left
/// with an identity transform. World placement of everything else is kept.
///
/// Returns `false` if the transform already was identity.
pub fn apply_transforms(scene: &mut Scene, object: usize) -> Result<bool> {
    let matrix = scene
        .local_matrix(object)
        .ok_or_else(|| anyhow!("Object {} does not exist", object))?;
    if matrix.abs_diff_eq(Mat4::IDENTITY, EPSILON) {
        scene.reset_transform(object);
        return Ok(false);
    }

    let bake = Bake::new(matrix);
    let node = &scene.document.nodes[object];
    match (node.mesh, node.skin) {
        (Some(mesh), None) => {
            let mesh = own_mesh(scene, object, mesh.value());
            bake_mesh(scene, mesh, &bake)?;
        }
        // Skinned meshes are placed by their joints, not by their node.
        (Some(_), Some(_)) => debug!("Skipping skinned mesh of object {}", object),
        _ => {}
    }

    for child in scene.children(object) {
        if let Some(local) = scene.local_matrix(child) {
            scene.set_local_matrix(child, matrix * local);
        }
    }
    bake_animations(scene, object, &bake)?;
    bake_inverse_bind_matrices(scene, object, &bake)?;

    scene.reset_transform(object);

    Ok(true)
}

/// Makes sure the mesh of an object is not shared with other objects, copying
/// it if necessary. Returns the index of the object's own mesh.
fn own_mesh(scene: &mut Scene, object: usize, mesh: usize) -> usize {
    let users = scene
        .document
        .nodes
        .iter()
        .filter(|node| node.mesh.map(|index| index.value()) == Some(mesh))
        .count();
    if users <= 1 {
        return mesh;
    }

    let copy = scene.document.meshes[mesh].clone();
    let index = scene.document.push(copy);
    scene.document.nodes[object].mesh = Some(index);
    debug!("Copied mesh {} to {} for object {}", mesh, index.value(), object);

    index.value()
}

fn bake_mesh(scene: &mut Scene, mesh: usize, bake: &Bake) -> Result<()> {
    let mut baked = HashMap::new();
    let primitives = scene
        .document
        .meshes
        .get(mesh)
        .map(|mesh| mesh.primitives.clone())
        .ok_or_else(|| anyhow!("Mesh {} does not exist", mesh))?;

    let mut new_primitives = Vec::with_capacity(primitives.len());
    for primitive in primitives {
        let mut new_primitive = primitive.clone();

        for (semantic, &accessor) in &primitive.attributes {
            let kind = match semantic {
                Checked::Valid(Semantic::Positions) => Kind::Position,
                Checked::Valid(Semantic::Normals) => Kind::Normal,
                Checked::Valid(Semantic::Tangents) => Kind::Tangent,
                _ => continue,
            };
            if let Some(index) = bake_accessor(scene, &mut baked, accessor, kind, bake) {
                new_primitive.attributes.insert(semantic.clone(), index);
            }
        }

        if let Some(targets) = &mut new_primitive.targets {
            for target in targets.iter_mut() {
                if let Some(accessor) = target.positions {
                    target.positions =
                        bake_accessor(scene, &mut baked, accessor, Kind::PositionDelta, bake)
                            .or(Some(accessor));
                }
                if let Some(accessor) = target.normals {
                    target.normals =
                        bake_accessor(scene, &mut baked, accessor, Kind::NormalDelta, bake)
                            .or(Some(accessor));
                }
                if let Some(accessor) = target.tangents {
                    target.tangents =
                        bake_accessor(scene, &mut baked, accessor, Kind::TangentDelta, bake)
                            .or(Some(accessor));
                }
            }
        }

        if bake.flip {
            match primitive.mode {
                Checked::Valid(Mode::Triangles) => {
                    new_primitive.indices = reverse_winding(scene, &mut baked, &primitive);
                }
                _ => warn!(
                    "Mirrored a primitive of mesh {} without reversing its winding",
                    mesh
                ),
            }
        }

        new_primitives.push(new_primitive);
    }

    scene.document.meshes[mesh].primitives = new_primitives;

    Ok(())
}

/// Writes a transformed copy of an accessor and returns its index, reusing a
/// previous copy if the accessor was already baked. Data that cannot be read
/// as floats is left as it is.
fn bake_accessor(
    scene: &mut Scene,
    baked: &mut HashMap<(usize, Kind), json::Index<json::Accessor>>,
    accessor: json::Index<json::Accessor>,
    kind: Kind,
    bake: &Bake,
) -> Option<json::Index<json::Accessor>> {
    if let Some(&index) = baked.get(&(accessor.value(), kind)) {
        return Some(index);
    }

    let Scene { document, blob } = scene;
    let result = match kind {
        Kind::Tangent => read_f32::<4>(document, blob, accessor).and_then(|values| {
            let values: Vec<_> = values.into_iter().map(|v| bake.tangent(v)).collect();
            push_f32(document, blob, &values, Type::Vec4, Some(Target::ArrayBuffer), false)
        }),
        _ => read_f32::<3>(document, blob, accessor).and_then(|values| {
            let values: Vec<_> = values.into_iter().map(|v| bake.vec3(kind, v)).collect();
            let bounds = matches!(kind, Kind::Position | Kind::PositionDelta);
            push_f32(document, blob, &values, Type::Vec3, Some(Target::ArrayBuffer), bounds)
        }),
    };

    match result {
        Ok(index) => {
            baked.insert((accessor.value(), kind), index);
            Some(index)
        }
        Err(err) => {
            warn!("Left accessor {} untouched: {}", accessor.value(), err);
            None
        }
    }
}

/// Reverses the winding of a triangle list so mirrored faces keep facing out.
fn reverse_winding(
    scene: &mut Scene,
    baked: &mut HashMap<(usize, Kind), json::Index<json::Accessor>>,
    primitive: &json::mesh::Primitive,
) -> Option<json::Index<json::Accessor>> {
    if let Some(accessor) = primitive.indices {
        if let Some(&index) = baked.get(&(accessor.value(), Kind::Indices)) {
            return Some(index);
        }
    }

    let Scene { document, blob } = scene;
    let indices = match primitive.indices {
        Some(accessor) => read_indices(document, blob, accessor),
        None => primitive
            .attributes
            .get(&Checked::Valid(Semantic::Positions))
            .and_then(|&positions| document.accessors.get(positions.value()))
            .map(|positions| (0..positions.count.0 as u32).collect())
            .ok_or_else(|| anyhow!("The primitive has no positions")),
    };

    let result = indices.and_then(|mut indices| {
        for i in 0..indices.len() / 3 {
            indices.swap(i * 3 + 1, i * 3 + 2);
        }
        push_indices(document, blob, &indices)
    });

    match result {
        Ok(index) => {
            if let Some(accessor) = primitive.indices {
                baked.insert((accessor.value(), Kind::Indices), index);
            }
            Some(index)
        }
        Err(err) => {
            warn!("Failed to reverse the winding of a primitive: {}", err);
            primitive.indices
        }
    }
}

/// Rewrites the transform animations of the object's children so they play
/// relative to the object's new identity transform.
fn bake_animations(scene: &mut Scene, object: usize, bake: &Bake) -> Result<()> {
    let children: HashSet<usize> = scene.children(object).into_iter().collect();

    for a in 0..scene.document.animations.len() {
        for c in 0..scene.document.animations[a].channels.len() {
            let channel = &scene.document.animations[a].channels[c];
            let node = channel.target.node.value();
            let sampler_index = channel.sampler.value();
            let property = match channel.target.path {
                Checked::Valid(property) => property,
                Checked::Invalid => continue,
            };
            if property == Property::MorphTargetWeights {
                continue;
            }
            if node == object {
                warn!(
                    "Animation {} moves object {}; its transform stays animated",
                    a, object
                );
                continue;
            }
            if !children.contains(&node) {
                continue;
            }

            let Some(sampler) = scene.document.animations[a].samplers.get(sampler_index).cloned()
            else {
                continue;
            };
            let cubic = sampler.interpolation == Checked::Valid(Interpolation::CubicSpline);

            let Scene { document, blob } = &mut *scene;
            let output = sampler.output;
            let result = match property {
                Property::Translation => read_f32::<3>(document, blob, output).and_then(|values| {
                    let values: Vec<_> = values
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| {
                            // Cubic spline outputs are in-tangent, value, out-tangent triples.
                            let kind = if cubic && i % 3 != 1 {
                                Kind::PositionDelta
                            } else {
                                Kind::Position
                            };
                            bake.vec3(kind, v)
                        })
                        .collect();
                    push_f32(document, blob, &values, Type::Vec3, None, false)
                }),
                Property::Rotation => read_f32::<4>(document, blob, output).and_then(|values| {
                    let values: Vec<_> = values
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| {
                            let rotation = bake.rotation * Quat::from_array(v);
                            if cubic && i % 3 != 1 {
                                rotation.to_array()
                            } else {
                                rotation.normalize().to_array()
                            }
                        })
                        .collect();
                    push_f32(document, blob, &values, Type::Vec4, None, false)
                }),
                _ => read_f32::<3>(document, blob, output).and_then(|values| {
                    let values: Vec<_> = values
                        .into_iter()
                        .map(|v| (bake.scale * Vec3::from(v)).to_array())
                        .collect();
                    push_f32(document, blob, &values, Type::Vec3, None, false)
                }),
            };

            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    warn!(
                        "Left channel {} of animation {} untouched: {}",
                        c, a, err
                    );
                    continue;
                }
            };

            let animation = &mut scene.document.animations[a];
            let shared = animation
                .channels
                .iter()
                .enumerate()
                .any(|(i, other)| i != c && other.sampler.value() == sampler_index);
            if shared {
                animation.samplers.push(json::animation::Sampler { output, ..sampler });
                animation.channels[c].sampler =
                    json::Index::new(animation.samplers.len() as u32 - 1);
            } else {
                animation.samplers[sampler_index].output = output;
            }
        }
    }

    Ok(())
}

/// Keeps skins bound to the object in their bind pose once the object's
/// transform is gone.
fn bake_inverse_bind_matrices(scene: &mut Scene, object: usize, bake: &Bake) -> Result<()> {
    for s in 0..scene.document.skins.len() {
        let skin = &scene.document.skins[s];
        let Some(joint) = skin.joints.iter().position(|joint| joint.value() == object) else {
            continue;
        };
        let (inverse_bind_matrices, joint_count) = (skin.inverse_bind_matrices, skin.joints.len());

        let Scene { document, blob } = &mut *scene;
        let mut matrices = match inverse_bind_matrices {
            Some(accessor) => match read_f32::<16>(document, blob, accessor) {
                Ok(matrices) => matrices,
                Err(err) => {
                    warn!("Left the inverse bind matrices of skin {} untouched: {}", s, err);
                    continue;
                }
            },
            None => vec![Mat4::IDENTITY.to_cols_array(); joint_count],
        };

        if let Some(inverse_bind) = matrices.get_mut(joint) {
            *inverse_bind = (bake.matrix * Mat4::from_cols_array(inverse_bind)).to_cols_array();
        }
        let accessor = push_f32(document, blob, &matrices, Type::Mat4, None, false)?;
        document.skins[s].inverse_bind_matrices = Some(accessor);
    }

    Ok(())
}

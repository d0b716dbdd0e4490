//! Scenes shared by the unit tests.

use gltf::json::{
    self,
    accessor::Type,
    animation::{Interpolation, Property},
    buffer::Target,
    mesh::{Mode, MorphTarget, Primitive, Semantic},
    validation::Checked,
};
use serde_json::value::to_raw_value;

use super::{
    accessor::{push_f32, push_indices},
    Scene,
};

pub fn node(name: &str) -> json::Node {
    json::Node {
        name: Some(name.to_string()),
        camera: None,
        children: None,
        extensions: None,
        extras: Default::default(),
        matrix: None,
        mesh: None,
        rotation: None,
        scale: None,
        translation: None,
        skin: None,
        weights: None,
    }
}

/// A small avatar:
///
/// ```text
/// 0 AvatarRoot (translation [0, 1, 0], scale 2)
/// ├── 1 Hips (translation [0, 0.5, 0], animated)
/// │   └── 3 Spine
/// └── 2 Head (translation [0, 0, 1], mesh 0 with shape keys aa, Blink, PP)
/// ```
pub fn avatar_scene() -> Scene {
    let mut root = json::Root::default();
    let mut blob = Vec::new();

    let positions = push_f32(
        &mut root,
        &mut blob,
        &[[0., 0., 0.], [1., 0., 0.], [0., 1., 0.]],
        Type::Vec3,
        Some(Target::ArrayBuffer),
        true,
    )
    .unwrap();
    let normals = push_f32(
        &mut root,
        &mut blob,
        &[[0., 0., 1.]; 3],
        Type::Vec3,
        Some(Target::ArrayBuffer),
        false,
    )
    .unwrap();
    let indices = push_indices(&mut root, &mut blob, &[0, 1, 2]).unwrap();
    let targets = (1..=3)
        .map(|i| MorphTarget {
            positions: Some(
                push_f32(
                    &mut root,
                    &mut blob,
                    &[[0., 0., 0.1 * i as f32]; 3],
                    Type::Vec3,
                    Some(Target::ArrayBuffer),
                    true,
                )
                .unwrap(),
            ),
            normals: None,
            tangents: None,
        })
        .collect();

    root.push(json::Mesh {
        name: Some(String::from("HeadMesh")),
        primitives: vec![Primitive {
            attributes: [
                (Checked::Valid(Semantic::Positions), positions),
                (Checked::Valid(Semantic::Normals), normals),
            ]
            .into_iter()
            .collect(),
            indices: Some(indices),
            material: None,
            mode: Checked::Valid(Mode::Triangles),
            targets: Some(targets),
            extensions: None,
            extras: Default::default(),
        }],
        weights: Some(vec![0.; 3]),
        extensions: None,
        extras: Some(
            to_raw_value(&serde_json::json!({
                "targetNames": ["aa", "Blink", "PP"],
                "part": "face",
            }))
            .unwrap(),
        ),
    });

    let mut avatar_root = node("AvatarRoot");
    avatar_root.translation = Some([0., 1., 0.]);
    avatar_root.scale = Some([2., 2., 2.]);
    avatar_root.children = Some(vec![json::Index::new(1), json::Index::new(2)]);
    let mut hips = node("Hips");
    hips.translation = Some([0., 0.5, 0.]);
    hips.children = Some(vec![json::Index::new(3)]);
    let mut head = node("Head");
    head.translation = Some([0., 0., 1.]);
    head.mesh = Some(json::Index::new(0));
    let spine = node("Spine");
    root.nodes = vec![avatar_root, hips, head, spine];

    root.scene = Some(json::Index::new(0));
    root.scenes.push(json::Scene {
        name: None,
        nodes: vec![json::Index::new(0)],
        extensions: None,
        extras: Default::default(),
    });

    let times = push_f32(&mut root, &mut blob, &[[0.], [1.]], Type::Scalar, None, true).unwrap();
    let translations = push_f32(
        &mut root,
        &mut blob,
        &[[0., 0.5, 0.], [0., 1., 0.]],
        Type::Vec3,
        None,
        false,
    )
    .unwrap();
    root.push(json::Animation {
        name: Some(String::from("Idle")),
        channels: vec![json::animation::Channel {
            sampler: json::Index::new(0),
            target: json::animation::Target {
                node: json::Index::new(1),
                path: Checked::Valid(Property::Translation),
                extensions: None,
                extras: Default::default(),
            },
            extensions: None,
            extras: Default::default(),
        }],
        samplers: vec![json::animation::Sampler {
            input: times,
            output: translations,
            interpolation: Checked::Valid(Interpolation::Linear),
            extensions: None,
            extras: Default::default(),
        }],
        extensions: None,
        extras: Default::default(),
    });

    root.push(json::Buffer {
        byte_length: blob.len().into(),
        name: None,
        uri: None,
        extensions: None,
        extras: Default::default(),
    });

    Scene::new(root, blob)
}

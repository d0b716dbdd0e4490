use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use gltf::json::{self, validation::Validate};
use log::{debug, warn};

use crate::conversion::{accessor::align_to, Asset, Importer, Scene};

#[derive(Default)]
pub struct GltfImporter {}

impl Importer for GltfImporter {
    fn import(&self, asset: &Asset, scene: &mut Scene) -> Result<()> {
        scene.clear();

        let gltf = gltf::Gltf::from_slice_without_validation(&asset.bytes)
            .context("Failed to deserialize the glTF asset")?;
        validate(gltf.as_json())?;
        let buffers = load_buffers(&gltf, asset.parent_dir())?;

        let mut document = gltf.document.into_json();
        let blob = merge_buffers(&mut document, buffers)?;
        debug!(
            "Imported {} objects, {} meshes and {} bytes of buffer data",
            document.nodes.len(),
            document.meshes.len(),
            blob.len()
        );

        scene.document = document;
        scene.blob = blob;

        Ok(())
    }

    fn extensions(&self) -> &[&str] {
        &["gltf", "glb"]
    }
}

/// Checks that the document can be edited and written back. Extensions this
/// crate does not model and missing optional data such as position bounds are
/// only reported, since the document is passed through untouched.
fn validate(root: &json::Root) -> Result<()> {
    let mut errors = Vec::new();
    root.validate(root, json::Path::new, &mut |path, error| match error {
        json::validation::Error::Unsupported | json::validation::Error::Missing => {
            warn!("{}: {}", path(), error)
        }
        _ => errors.push(format!("{}: {}", path(), error)),
    });

    if !errors.is_empty() {
        bail!("Invalid glTF: {}", errors.join("; "));
    }

    Ok(())
}

/// Concatenates all buffers into a single one and points every buffer view at
/// it, so the scene can be written back as a GLB with one binary chunk.
fn merge_buffers(document: &mut json::Root, buffers: Vec<Vec<u8>>) -> Result<Vec<u8>> {
    let mut blob = Vec::new();
    let mut offsets = Vec::with_capacity(buffers.len());
    for buffer in buffers {
        align_to(&mut blob, 4);
        offsets.push(blob.len());
        blob.extend_from_slice(&buffer);
    }

    for view in &mut document.buffer_views {
        let offset = offsets
            .get(view.buffer.value())
            .copied()
            .unwrap_or_default();
        let view_offset = view.byte_offset.map(|o| o.0 as usize).unwrap_or_default();
        let merged_offset = view_offset
            .checked_add(offset)
            .ok_or_else(|| anyhow!("Buffer view at {} overruns the buffer", view_offset))?;
        view.buffer = json::Index::new(0);
        view.byte_offset = Some(merged_offset.into());
    }

    document.buffers = if offsets.is_empty() {
        Vec::new()
    } else {
        vec![json::Buffer {
            byte_length: blob.len().into(),
            name: None,
            uri: None,
            extensions: None,
            extras: Default::default(),
        }]
    };

    Ok(blob)
}

// Adapted from https://github.com/bevyengine/bevy/blob/c6fec1f0c256597af9746050dd1a4dcd3b80fe24/crates/bevy_gltf/src/loader.rs#L643
fn load_buffers(gltf: &gltf::Gltf, asset_dir: &Path) -> Result<Vec<Vec<u8>>> {
    const VALID_MIME_TYPES: &[&str] = &["application/octet-stream", "application/gltf-buffer"];

    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Uri(uri) => {
                let buffer_bytes = match DataUri::parse(uri) {
                    Ok(data_uri) if VALID_MIME_TYPES.contains(&data_uri.mime_type) => {
                        data_uri.decode()?
                    }
                    Ok(_) => return Err(anyhow!("Buffer format unsupported")),
                    Err(()) => {
                        let buffer_path = asset_dir.join(uri);
                        std::fs::read(&buffer_path).with_context(|| {
                            format!("Failed to read the buffer \"{}\"", buffer_path.display())
                        })?
                    }
                };
                buffer_data.push(buffer_bytes);
            }
            gltf::buffer::Source::Bin => {
                if let Some(blob) = gltf.blob.as_deref() {
                    buffer_data.push(blob.into());
                } else {
                    return Err(anyhow!("The GLB binary chunk is missing"));
                }
            }
        }
    }

    Ok(buffer_data)
}

// Taken from https://github.com/bevyengine/bevy/blob/c6fec1f0c256597af9746050dd1a4dcd3b80fe24/crates/bevy_gltf/src/loader.rs#L742
struct DataUri<'a> {
    mime_type: &'a str,
    base64: bool,
    data: &'a str,
}

impl<'a> DataUri<'a> {
    fn parse(uri: &'a str) -> Result<DataUri<'a>, ()> {
        let uri = uri.strip_prefix("data:").ok_or(())?;
        let (mime_type, data) = uri.split_once(',').ok_or(())?;

        let (mime_type, base64) = match mime_type.strip_suffix(";base64") {
            Some(mime_type) => (mime_type, true),
            None => (mime_type, false),
        };

        Ok(DataUri {
            mime_type,
            base64,
            data,
        })
    }

    fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        if self.base64 {
            base64::decode(self.data)
        } else {
            Ok(self.data.as_bytes().to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use gltf::json::{mesh::Semantic, validation::Checked};
    use pretty_assertions::assert_eq;

    use crate::conversion::testing::avatar_scene;

    use super::*;

    fn data_uri(bytes: &[u8]) -> String {
        format!("data:application/octet-stream;base64,{}", base64::encode(bytes))
    }

    fn gltf_asset(document: &json::Root) -> Asset {
        let bytes = json::serialize::to_vec(document).unwrap();
        Asset::new(bytes, "avatar.gltf")
    }

    #[test]
    fn embedded_buffer() {
        let source = avatar_scene();
        let mut document = source.document.clone();
        document.buffers[0].uri = Some(data_uri(&source.blob));

        let mut scene = Scene::default();
        GltfImporter::default()
            .import(&gltf_asset(&document), &mut scene)
            .unwrap();

        assert_eq!(source.blob, scene.blob);
        assert_eq!(1, scene.document.buffers.len());
        assert_eq!(None, scene.document.buffers[0].uri);
        assert_eq!(Some(0), scene.find_object("AvatarRoot"));
        assert_eq!(vec!["aa", "Blink", "PP"], scene.shape_keys(0));
    }

    #[test]
    fn buffers_are_merged() {
        let source = avatar_scene();
        let mut document = source.document.clone();
        document.buffers[0].uri = Some(data_uri(&source.blob));
        document.buffers.push(json::Buffer {
            byte_length: 4usize.into(),
            name: None,
            uri: Some(data_uri(&[1, 2, 3, 4])),
            extensions: None,
            extras: Default::default(),
        });
        document.buffer_views.push(json::buffer::View {
            buffer: json::Index::new(1),
            byte_length: 4usize.into(),
            byte_offset: None,
            byte_stride: None,
            name: None,
            target: None,
            extensions: None,
            extras: Default::default(),
        });

        let mut scene = Scene::default();
        GltfImporter::default()
            .import(&gltf_asset(&document), &mut scene)
            .unwrap();

        let view = scene.document.buffer_views.last().unwrap();
        let offset = view.byte_offset.unwrap().0 as usize;
        assert_eq!(0, view.buffer.value());
        assert_eq!(source.blob.len(), offset);
        assert_eq!(source.blob.len() + 4, scene.blob.len());
        assert_eq!(&[1, 2, 3, 4], &scene.blob[offset..]);
        assert_eq!(1, scene.document.buffers.len());
    }

    fn import_document(document: &json::Root) -> Result<Scene> {
        let mut scene = Scene::default();
        GltfImporter::default().import(&gltf_asset(document), &mut scene)?;
        Ok(scene)
    }

    #[test]
    fn required_extensions() {
        let source = avatar_scene();
        let mut document = source.document.clone();
        document.buffers[0].uri = Some(data_uri(&source.blob));
        let extensions = vec![
            String::from("KHR_mesh_quantization"),
            String::from("KHR_texture_transform"),
            String::from("KHR_materials_unlit"),
        ];
        document.extensions_used = extensions.clone();
        document.extensions_required = extensions.clone();

        let scene = import_document(&document).unwrap();

        assert_eq!(extensions, scene.document.extensions_required);
        assert_eq!(vec!["aa", "Blink", "PP"], scene.shape_keys(0));
    }

    #[test]
    fn positions_without_bounds() {
        let source = avatar_scene();
        let mut document = source.document.clone();
        document.buffers[0].uri = Some(data_uri(&source.blob));
        let positions = document.meshes[0].primitives[0].attributes
            [&Checked::Valid(Semantic::Positions)]
            .value();
        document.accessors[positions].min = None;
        document.accessors[positions].max = None;

        let scene = import_document(&document).unwrap();

        assert_eq!(None, scene.document.accessors[positions].min);
    }

    #[test]
    fn broken_references() {
        let source = avatar_scene();
        let mut document = source.document.clone();
        document.buffers[0].uri = Some(data_uri(&source.blob));
        document.nodes[0].children = Some(vec![json::Index::new(42)]);

        assert!(import_document(&document).is_err());
    }

    #[test]
    fn overflowing_view_offset() {
        let source = avatar_scene();
        let mut document = source.document.clone();
        document.buffers[0].uri = Some(data_uri(&source.blob));
        document.buffers.push(json::Buffer {
            byte_length: 4usize.into(),
            name: None,
            uri: Some(data_uri(&[1, 2, 3, 4])),
            extensions: None,
            extras: Default::default(),
        });
        document.buffer_views.push(json::buffer::View {
            buffer: json::Index::new(1),
            byte_length: 4usize.into(),
            byte_offset: Some(json::validation::USize64(u64::MAX)),
            byte_stride: None,
            name: None,
            target: None,
            extensions: None,
            extras: Default::default(),
        });

        assert!(import_document(&document).is_err());
    }

    #[test]
    fn invalid_asset() {
        let mut scene = avatar_scene();
        let asset = Asset::new(b"not a model".to_vec(), "avatar.glb");

        assert!(GltfImporter::default().import(&asset, &mut scene).is_err());
        assert!(scene.is_empty());
    }

    #[test]
    fn parse_data_uri() {
        let uri = DataUri::parse("data:application/gltf-buffer;base64,AQID").unwrap();

        assert_eq!("application/gltf-buffer", uri.mime_type);
        assert_eq!(vec![1, 2, 3], uri.decode().unwrap());
        assert!(DataUri::parse("buffer.bin").is_err());
    }
}

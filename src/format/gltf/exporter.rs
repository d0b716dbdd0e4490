use std::path::Path;

use anyhow::Result;
use gltf::{json, Glb};

use crate::conversion::{accessor::align_to, Asset, Exporter, Scene};

#[derive(Default)]
pub struct GltfExporter {}

// https://www.khronos.org/registry/glTF/specs/2.0/glTF-2.0.html
impl Exporter for GltfExporter {
    fn export(&self, scene: &Scene, path: &Path) -> Result<Asset> {
        let mut root = scene.document.clone();
        let mut buffer = scene.blob.clone();
        align_to(&mut buffer, 4);

        insert_buffers(&mut root, &buffer);
        root.asset.generator = Some(format!(
            "{} {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ));

        let json_string = json::serialize::to_string(&root)?;
        let bytes = Glb {
            header: gltf::binary::Header {
                magic: *b"glTF",
                version: 2,
                length: calculate_length(&json_string, &buffer) as u32,
            },
            json: json_string.into_bytes().into(),
            bin: if buffer.is_empty() {
                None
            } else {
                Some(buffer.into())
            },
        }
        .to_vec()?;

        Ok(Asset::new(bytes, path))
    }
}

fn calculate_length(json: &str, bin: &[u8]) -> usize {
    const HEADER_SIZE: usize = 12;
    const CHUNK_HEADER_SIZE: usize = 8;

    let mut length = HEADER_SIZE + CHUNK_HEADER_SIZE + padded(json.len());
    if !bin.is_empty() {
        length += CHUNK_HEADER_SIZE + padded(bin.len());
    }

    length
}

fn padded(length: usize) -> usize {
    (length + 3) & !3
}

/// Points the document at the single binary chunk of the GLB.
fn insert_buffers(root: &mut json::Root, buffer: &[u8]) {
    if buffer.is_empty() {
        root.buffers.clear();
        return;
    }

    let mut gltf_buffer = root.buffers.first().cloned().unwrap_or(json::Buffer {
        byte_length: 0usize.into(),
        uri: None,
        name: None,
        extensions: None,
        extras: Default::default(),
    });
    gltf_buffer.byte_length = buffer.len().into();
    gltf_buffer.uri = None;
    root.buffers = vec![gltf_buffer];
}

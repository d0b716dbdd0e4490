pub use self::gltf::{GltfExporter, GltfImporter};

pub mod gltf;

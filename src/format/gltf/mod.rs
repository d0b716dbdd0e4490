pub use {exporter::GltfExporter, importer::GltfImporter};

mod exporter;
mod importer;

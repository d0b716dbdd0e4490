use std::path::Path;

use anyhow::Result;

pub use self::{
    asset::Asset,
    scene::{Scene, Traverse},
};

pub mod accessor;
mod asset;
mod bake;
mod scene;
#[cfg(test)]
pub(crate) mod testing;

/// Defines a type that can import asset files into a scene.
pub trait Importer {
    /// Clears a scene and imports an asset file into it.
    fn import(&self, asset: &Asset, scene: &mut Scene) -> Result<()>;
    /// Returns the file extensions supported by the importer. These extensions are used to
    /// select the appropriate importer given an asset file.
    ///
    /// The extension should not include the period (e.g "zip", not ".zip").
    fn extensions(&self) -> &[&str];

    /// Returns whether the importer can read the given asset, judging by its extension.
    fn supports(&self, asset: &Asset) -> bool {
        let extension = asset.extension().to_lowercase();
        self.extensions().iter().any(|&ext| ext == extension)
    }
}

/// Defines a type that can export a scene into an asset file.
pub trait Exporter {
    /// Exports a scene into an asset destined for the given path.
    fn export(&self, scene: &Scene, path: &Path) -> Result<Asset>;
}

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// The raw bytes of an asset file and the path they belong to.
#[derive(Debug, Clone)]
pub struct Asset {
    pub bytes: Vec<u8>,
    path: PathBuf,
}

impl Asset {
    pub fn new(bytes: Vec<u8>, path: impl Into<PathBuf>) -> Self {
        Self {
            bytes,
            path: path.into(),
        }
    }

    /// Reads the asset file at the given path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read \"{}\"", path.display()))?;
        Ok(Self::new(bytes, path))
    }

    /// Get a reference to the asset's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
    }

    /// The extension should not include the period (e.g "glb", not ".glb").
    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
    }

    pub fn parent_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Writes the asset bytes to its path, replacing any existing file.
    ///
    /// The bytes go to a sibling temporary file first, which is then renamed
    /// over the destination. Symbolic links are written through and the
    /// permissions of an existing file are kept.
    pub fn write(&self) -> Result<()> {
        let path = fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        let permissions = fs::metadata(&path)
            .ok()
            .map(|metadata| metadata.permissions());

        let uid = uuid::Uuid::new_v4().simple().to_string();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("asset");
        let temp_path = path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(format!(".{}.{}.tmp", file_name, &uid[..uid.len() / 2]));

        fs::write(&temp_path, &self.bytes)
            .with_context(|| format!("Failed to write \"{}\"", temp_path.display()))?;
        let replaced = match permissions {
            Some(permissions) => fs::set_permissions(&temp_path, permissions),
            None => Ok(()),
        }
        .and_then(|_| fs::rename(&temp_path, &path));
        if let Err(err) = replaced {
            let _ = fs::remove_file(&temp_path);
            return Err(err).with_context(|| {
                format!("Failed to replace \"{}\"", self.path.display())
            });
        }

        Ok(())
    }
}

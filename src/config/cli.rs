use crate::core::Storage;
use crate::utils::error::Result;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Persists downloaded objects under a base directory, mirroring object
/// names as relative paths. Object names come from bucket listings, so
/// anything that would resolve outside the base directory is rejected.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }

    fn object_path(&self, object_name: &str) -> Result<PathBuf> {
        let relative = Path::new(object_name);
        let contained = !relative.as_os_str().is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("object name escapes the output directory: {}", object_name),
            )
            .into());
        }
        Ok(Path::new(&self.base_path).join(relative))
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.object_path(path)?;
        let data = fs::read(full_path)?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.object_path(path)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(full_path, data)?;
        Ok(())
    }
}

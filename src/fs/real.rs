use super::FileSystem;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).context(format!("Failed to read file {:?}", path))
    }

    fn write_new(&self, path: &Path, contents: &str) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .context(format!("Failed to create file {:?}", path))?;
        file.write_all(contents.as_bytes())
            .context(format!("Failed to write file {:?}", path))?;
        file.sync_all()
            .context(format!("Failed to flush file {:?}", path))
    }
}

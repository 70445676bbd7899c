use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// `None` marks a directory
type MockEntry = Option<String>;

/// In-memory file system for detection tests
pub struct MockFileSystem {
    files: RwLock<HashMap<PathBuf, MockEntry>>,
    root: PathBuf,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/mock"))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = self.normalize_path(path.as_ref());
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = path.parent() {
            Self::ensure_parents(&mut files, parent);
        }

        files.insert(
            path,
            Some(content.to_string()),
        );
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = self.normalize_path(path.as_ref());
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);

        Self::ensure_parents(&mut files, &path);
    }

    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn ensure_parents(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            files.entry(current.clone()).or_insert(None);
        }
    }

    fn entry(&self, path: &Path) -> Option<MockEntry> {
        let path = self.normalize_path(path);
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path)
            .cloned()
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.entry(path).is_some()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let entry = self
            .entry(path)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))?;

        entry.ok_or_else(|| anyhow!("Not a file: {:?}", path))
    }

    fn write_new(&self, path: &Path, contents: &str) -> Result<()> {
        if self.exists(path) {
            return Err(anyhow!("File exists: {:?}", path));
        }
        self.add_file(path, contents);
        Ok(())
    }
}

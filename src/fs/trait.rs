//! FileSystem trait definition

use anyhow::Result;
use std::path::Path;

/// Abstraction over the few file system operations detection needs
pub trait FileSystem: Send + Sync {
    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Read file contents as string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Create a new file with the given contents.
    ///
    /// Fails if anything already exists at `path`.
    fn write_new(&self, path: &Path, contents: &str) -> Result<()>;
}

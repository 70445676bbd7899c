//! Streaming tar extraction into a staging directory
//!
//! Entries are written as they are decoded; nothing is buffered in memory
//! beyond a single entry's copy buffer. Entry order in the stream does not have
//! to respect the directory hierarchy.

use crate::error::ExtractionError;
use std::fs::{self, File, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, warn};

/// What an extraction run produced
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub directories: usize,
    pub files: usize,
    /// Entries of unsupported kinds, as `(path, kind)`
    pub skipped: Vec<(String, String)>,
}

/// Extract every directory and regular file from `reader` under `root`.
///
/// Permission bits are preserved. Directory modes are applied once all
/// entries are in place so that a read-only directory does not block the
/// files beneath it.
pub fn extract<R: Read>(reader: R, root: &Path) -> Result<ExtractSummary, ExtractionError> {
    let mut archive = Archive::new(reader);
    let mut summary = ExtractSummary::default();
    let mut dir_modes: Vec<(PathBuf, u32)> = Vec::new();

    for entry in archive.entries().map_err(ExtractionError::Decode)? {
        let mut entry = entry.map_err(ExtractionError::Decode)?;
        let raw_path = entry.path().map_err(ExtractionError::Decode)?.into_owned();
        let relative = sanitize(&raw_path)?;
        let mode = entry.header().mode().map_err(ExtractionError::Decode)? & 0o7777;
        let entry_type = entry.header().entry_type();

        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = root.join(&relative);

        match entry_type {
            EntryType::Directory => {
                debug!("Creating directory: {}", target.display());
                create_dir_all(&target)?;
                dir_modes.push((target, mode));
                summary.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                debug!("Untarring: {}", target.display());
                if let Some(parent) = target.parent() {
                    create_dir_all(parent)?;
                }
                let mut file = File::create(&target).map_err(|e| io_error(&target, e))?;
                io::copy(&mut entry, &mut file).map_err(|e| match e.kind() {
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                        ExtractionError::Decode(e)
                    }
                    _ => io_error(&target, e),
                })?;
                file.set_permissions(Permissions::from_mode(mode))
                    .map_err(|e| io_error(&target, e))?;
                summary.files += 1;
            }
            other => {
                let kind = format!("{:?}", other);
                warn!(path = %relative.display(), kind = %kind, "Skipping unsupported archive entry");
                summary
                    .skipped
                    .push((relative.display().to_string(), kind));
            }
        }
    }

    // Deepest first, so tightening a parent never blocks a child chmod
    dir_modes.sort_by(|a, b| b.0.components().count().cmp(&a.0.components().count()));
    for (path, mode) in dir_modes {
        fs::set_permissions(&path, Permissions::from_mode(mode))
            .map_err(|e| io_error(&path, e))?;
    }

    Ok(summary)
}

/// Normalize an entry path so it can only ever land under the staging root.
fn sanitize(path: &Path) -> Result<PathBuf, ExtractionError> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractionError::UnsafePath(path.display().to_string()));
            }
        }
    }
    Ok(clean)
}

fn create_dir_all(path: &Path) -> Result<(), ExtractionError> {
    fs::create_dir_all(path).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: io::Error) -> ExtractionError {
    ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tar::{Builder, Header};
    use tempfile::TempDir;

    enum Item<'a> {
        Dir(&'a str, u32),
        File(&'a str, u32, &'a [u8]),
    }

    fn build_archive(items: &[Item]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for item in items {
            let mut header = Header::new_ustar();
            match item {
                Item::Dir(path, mode) => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_mode(*mode);
                    header.set_size(0);
                    header.set_cksum();
                    builder.append_data(&mut header, path, io::empty()).unwrap();
                }
                Item::File(path, mode, data) => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_mode(*mode);
                    header.set_size(data.len() as u64);
                    header.set_cksum();
                    builder.append_data(&mut header, path, *data).unwrap();
                }
            }
        }
        builder.into_inner().unwrap()
    }

    fn snapshot(root: &Path) -> BTreeMap<String, u32> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, u32>) {
            for entry in fs::read_dir(dir).unwrap() {
                let entry = entry.unwrap();
                let path = entry.path();
                let meta = fs::symlink_metadata(&path).unwrap();
                let rel = path.strip_prefix(root).unwrap().display().to_string();
                out.insert(rel, meta.permissions().mode() & 0o7777);
                if meta.is_dir() {
                    walk(root, &path, out);
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(root, root, &mut out);
        out
    }

    #[test]
    fn test_extracts_files_and_modes() {
        let temp = TempDir::new().unwrap();
        let data = build_archive(&[
            Item::Dir("src", 0o755),
            Item::File("src/main.go", 0o644, b"package main\n"),
            Item::File("run.sh", 0o755, b"#!/bin/sh\n"),
        ]);

        let summary = extract(data.as_slice(), temp.path()).unwrap();
        assert_eq!(summary.directories, 1);
        assert_eq!(summary.files, 2);
        assert!(summary.skipped.is_empty());

        let tree = snapshot(temp.path());
        assert_eq!(tree.get("src"), Some(&0o755));
        assert_eq!(tree.get("src/main.go"), Some(&0o644));
        assert_eq!(tree.get("run.sh"), Some(&0o755));
        assert_eq!(
            fs::read_to_string(temp.path().join("src/main.go")).unwrap(),
            "package main\n"
        );
    }

    #[test]
    fn test_order_independent() {
        let ordered = TempDir::new().unwrap();
        let reversed = TempDir::new().unwrap();

        let items = [
            Item::Dir("app", 0o750),
            Item::Dir("app/lib", 0o700),
            Item::File("app/lib/util.py", 0o600, b"x = 1\n"),
            Item::File("app/main.py", 0o640, b"print()\n"),
        ];
        let reversed_items = [
            Item::File("app/main.py", 0o640, b"print()\n"),
            Item::File("app/lib/util.py", 0o600, b"x = 1\n"),
            Item::Dir("app/lib", 0o700),
            Item::Dir("app", 0o750),
        ];

        extract(build_archive(&items).as_slice(), ordered.path()).unwrap();
        extract(build_archive(&reversed_items).as_slice(), reversed.path()).unwrap();

        let expected: BTreeMap<String, u32> = [
            ("app".to_string(), 0o750),
            ("app/lib".to_string(), 0o700),
            ("app/lib/util.py".to_string(), 0o600),
            ("app/main.py".to_string(), 0o640),
        ]
        .into_iter()
        .collect();
        assert_eq!(snapshot(ordered.path()), expected);
        assert_eq!(snapshot(reversed.path()), expected);
    }

    #[test]
    fn test_read_only_directory_still_receives_files() {
        let temp = TempDir::new().unwrap();
        let data = build_archive(&[
            Item::Dir("ro", 0o555),
            Item::File("ro/data.txt", 0o444, b"frozen"),
        ]);

        extract(data.as_slice(), temp.path()).unwrap();

        let tree = snapshot(temp.path());
        assert_eq!(tree.get("ro"), Some(&0o555));
        assert_eq!(tree.get("ro/data.txt"), Some(&0o444));

        // Let the TempDir clean up after itself
        fs::set_permissions(temp.path().join("ro"), Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_skips_symlinks() {
        let temp = TempDir::new().unwrap();
        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder
            .append_link(&mut header, "link", "/etc/passwd")
            .unwrap();
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(2);
        header.set_mode(0o644);
        builder.append_data(&mut header, "main.go", &b"ok"[..]).unwrap();
        let data = builder.into_inner().unwrap();

        let summary = extract(data.as_slice(), temp.path()).unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].0, "link");
        assert!(!temp.path().join("link").exists());
    }

    #[test]
    fn test_rejects_parent_traversal() {
        assert!(matches!(
            sanitize(Path::new("../escape.txt")),
            Err(ExtractionError::UnsafePath(_))
        ));
        assert!(matches!(
            sanitize(Path::new("a/../../escape.txt")),
            Err(ExtractionError::UnsafePath(_))
        ));
        assert!(matches!(
            sanitize(Path::new("/etc/passwd")),
            Err(ExtractionError::UnsafePath(_))
        ));
        assert_eq!(
            sanitize(Path::new("./src/./main.go")).unwrap(),
            PathBuf::from("src/main.go")
        );
    }

    #[test]
    fn test_rejects_traversal_in_archive() {
        let temp = TempDir::new().unwrap();
        let mut data = Vec::new();
        {
            // Builder refuses to write `..` paths, so patch the header by hand
            let mut header = Header::new_old();
            header.as_old_mut().name[..12].copy_from_slice(b"../evil.txt\0");
            header.set_entry_type(EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(0);
            header.set_cksum();
            data.extend_from_slice(header.as_bytes());
            data.extend_from_slice(&[0u8; 1024]);
        }

        let err = extract(data.as_slice(), temp.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsafePath(_)));
        assert!(!temp.path().parent().unwrap().join("evil.txt").exists());
    }

    #[test]
    fn test_truncated_archive_is_decode_error() {
        let temp = TempDir::new().unwrap();
        let data = build_archive(&[Item::File("big.bin", 0o644, &[7u8; 4096])]);

        let err = extract(&data[..1024], temp.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::Decode(_)), "{:?}", err);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let temp = TempDir::new().unwrap();
        let garbage = vec![0x41u8; 512];

        let err = extract(garbage.as_slice(), temp.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::Decode(_)), "{:?}", err);
    }

    #[test]
    fn test_empty_archive() {
        let temp = TempDir::new().unwrap();
        let data = build_archive(&[]);

        let summary = extract(data.as_slice(), temp.path()).unwrap();
        assert_eq!(summary, ExtractSummary::default());
    }
}

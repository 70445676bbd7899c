use super::templates::{DESCRIPTOR_FILE, MARKERS};
use super::{Detection, ProjectType};
use crate::error::{DescriptorWriteError, DetectionError};
use crate::fs::FileSystem;
use std::path::Path;
use tracing::{debug, info};

/// Resolve the project type of an extracted upload.
///
/// An explicit `Dockerfile` wins outright. Otherwise every marker in
/// [`MARKERS`] is probed and exactly one must match; there is no precedence
/// between templated types.
pub fn detect(fs: &dyn FileSystem, dir: &Path) -> Result<Detection, DetectionError> {
    let explicit = dir.join(DESCRIPTOR_FILE);
    if fs.exists(&explicit) {
        debug!("Found explicit descriptor at {}", explicit.display());
        let content = fs
            .read_to_string(&explicit)
            .map_err(|e| DetectionError::Unreadable {
                path: explicit.clone(),
                message: format!("{:#}", e),
            })?;
        return Ok(Detection::explicit(content));
    }

    let matches: Vec<_> = MARKERS
        .iter()
        .filter(|marker| fs.exists(&dir.join(marker.file_name)))
        .collect();

    match matches.as_slice() {
        [] => Err(DetectionError::None),
        [marker] => {
            info!(
                project_type = %marker.project_type,
                marker = marker.file_name,
                "Detected project type"
            );
            Ok(Detection::templated(marker.project_type, marker.template))
        }
        _ => Err(DetectionError::Ambiguous(
            matches
                .iter()
                .map(|m| m.project_type.name().to_string())
                .collect(),
        )),
    }
}

/// Write the templated descriptor into `dir` unless one is already there.
///
/// Returns whether a file was written. Explicit detections never write.
pub fn write_descriptor(
    fs: &dyn FileSystem,
    dir: &Path,
    detection: &Detection,
) -> Result<bool, DescriptorWriteError> {
    if detection.project_type == ProjectType::Explicit {
        return Ok(false);
    }

    let path = dir.join(DESCRIPTOR_FILE);
    if fs.exists(&path) {
        return Ok(false);
    }

    fs.write_new(&path, &detection.descriptor)
        .map_err(|e| DescriptorWriteError {
            path: path.clone(),
            message: format!("{:#}", e),
        })?;
    debug!("Wrote {} template to {}", detection.project_type, path.display());
    Ok(true)
}

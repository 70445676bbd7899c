//! Error taxonomy for the per-connection pipeline
//!
//! Every stage has its own error type so that tests can match on the exact
//! failure. [`PipelineError`] wraps all of them; any `PipelineError` ends the
//! connection with the generic failure result line. [`CleanupError`] is kept
//! apart because it can only happen after the result line has been sent.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// The image reference could not be generated
#[derive(Debug, Error)]
pub enum IdentifierError {
    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },
}

/// The staging directory could not be created
#[derive(Debug, Error)]
#[error("Failed to create staging directory under {root}: {source}")]
pub struct StagingError {
    pub root: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Archive decoding or writing failed
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to read archive: {0}")]
    Decode(#[source] io::Error),

    #[error("Refusing to extract unsafe path: {0}")]
    UnsafePath(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Extraction task failed: {0}")]
    Aborted(String),
}

/// Project type could not be resolved
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Could not determine build type.")]
    None,

    #[error("Could not determine build type. Found multiple types: {}", .0.join(", "))]
    Ambiguous(Vec<String>),

    #[error("Failed to read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("Detection task failed: {0}")]
    Aborted(String),
}

/// The templated descriptor could not be written
#[derive(Debug, Error)]
#[error("Failed to write {path}: {message}")]
pub struct DescriptorWriteError {
    pub path: PathBuf,
    pub message: String,
}

/// An external builder invocation failed
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} {step} failed: {status}")]
    Exit {
        program: String,
        step: &'static str,
        status: ExitStatus,
    },
}

/// Any failure that happens before the result line is sent
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    IdentifierGeneration(#[from] IdentifierError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    DescriptorWrite(#[from] DescriptorWriteError),

    #[error(transparent)]
    BuildCommand(CommandError),

    #[error(transparent)]
    PushCommand(CommandError),
}

impl PipelineError {
    /// Short stage name used as a structured log field
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::IdentifierGeneration(_) => "tag",
            PipelineError::Staging(_) => "staging",
            PipelineError::Extraction(_) => "extract",
            PipelineError::Detection(_) => "detect",
            PipelineError::DescriptorWrite(_) => "descriptor",
            PipelineError::BuildCommand(_) => "build",
            PipelineError::PushCommand(_) => "push",
        }
    }
}

/// The staging directory could not be removed
#[derive(Debug, Error)]
#[error("Could not clean up {path}: {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

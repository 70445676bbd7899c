//! deployc - build-and-push service for uploaded project tarballs
//!
//! A client opens a TCP connection and streams a tar archive of its project.
//! The server extracts it into a private staging directory, works out what
//! kind of project it is, writes a `Dockerfile` from a built-in template if
//! the project did not ship one, then has an external builder build and push
//! the image. Builder output is relayed back line by line, with the image
//! reference redacted, and the connection ends with a single result line.
//!
//! # Project Structure
//!
//! - [`archive`]: streaming tar extraction
//! - [`detection`]: project type detection and descriptor templates
//! - [`relay`]: line relays and the connection writer
//! - [`builder`]: build/push orchestration
//! - [`protocol`]: the outbound line protocol
//! - [`pipeline`]: the per-connection worker
//! - [`server`]: the TCP listener

pub mod archive;
pub mod builder;
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod fs;
pub mod pipeline;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod staging;
pub mod tag;
pub mod util;

// Re-export key types for convenient access
pub use config::{ConfigError, DeploycConfig};
pub use detection::{Detection, ProjectType};
pub use error::PipelineError;
pub use pipeline::PipelineContext;
pub use protocol::ResultLine;
pub use server::Server;
pub use tag::ImageTag;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

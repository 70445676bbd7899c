//! Project type detection and build descriptor materialization
//!
//! A staging directory either carries its own `Dockerfile`, in which case it is
//! used verbatim, or exactly one ecosystem marker file that selects one of the
//! built-in templates.

pub mod detector;
pub mod templates;
pub mod types;

pub use detector::{detect, write_descriptor};
pub use templates::{Marker, DESCRIPTOR_FILE, MARKERS};
pub use types::{Detection, ProjectType};

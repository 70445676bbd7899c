use std::borrow::Cow;
use std::fmt;

/// Closed set of project types the service knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectType {
    /// The upload carries its own build descriptor
    Explicit,
    JavaScript,
    Python,
    Go,
}

impl ProjectType {
    /// Label shown to clients, e.g. in "Found Go app. Building."
    pub fn name(&self) -> &'static str {
        match self {
            Self::Explicit => "Dockerfile",
            Self::JavaScript => "JavaScript",
            Self::Python => "Python",
            Self::Go => "Go",
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit)
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a successful detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub project_type: ProjectType,
    /// Descriptor text: read from the upload for `Explicit`, a template otherwise
    pub descriptor: Cow<'static, str>,
}

impl Detection {
    pub fn explicit(content: String) -> Self {
        Self {
            project_type: ProjectType::Explicit,
            descriptor: Cow::Owned(content),
        }
    }

    pub fn templated(project_type: ProjectType, template: &'static str) -> Self {
        Self {
            project_type,
            descriptor: Cow::Borrowed(template),
        }
    }
}

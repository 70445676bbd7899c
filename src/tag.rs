//! Per-connection image references

use crate::error::IdentifierError;
use std::fmt;
use uuid::Uuid;

/// Fully qualified image reference, `<registry>/<uuid>`.
///
/// A fresh v4 UUID is drawn for every connection, so two connections never
/// share a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageTag(String);

impl ImageTag {
    pub fn generate(registry: &str) -> Result<Self, IdentifierError> {
        Self::with_id(registry, Uuid::new_v4())
    }

    pub fn with_id(registry: &str, id: Uuid) -> Result<Self, IdentifierError> {
        let reference = format!("{}/{}", registry.trim_end_matches('/'), id.hyphenated());
        validate(&reference, registry)?;
        Ok(Self(reference))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The same reference with the implicit `latest` qualifier spelled out
    pub fn latest(&self) -> String {
        format!("{}:latest", self.0)
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ImageTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate(reference: &str, registry: &str) -> Result<(), IdentifierError> {
    let invalid = |reason: &str| IdentifierError::InvalidReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    };

    if registry.trim_end_matches('/').is_empty() {
        return Err(invalid("registry host is empty"));
    }
    if registry.contains("://") {
        return Err(invalid("registry must not include a scheme"));
    }
    if reference.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("reference contains whitespace"));
    }
    Ok(())
}

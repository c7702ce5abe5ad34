use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

const MAX_CODE_LEN: usize = 100;

/// Permission code wrapper (`resource:action`).
///
/// Codes are matched exactly; there is no wildcard or hierarchy semantics.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionCode(String);

impl PermissionCode {
    /// Parses and validates a permission code.
    ///
    /// This trims whitespace and normalizes to lowercase.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidPermission(
                "permission must not be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_CODE_LEN {
            return Err(Error::InvalidPermission(format!(
                "permission length must be <= {MAX_CODE_LEN}"
            )));
        }
        let normalized = trimmed.to_ascii_lowercase();
        validate(&normalized)?;
        Ok(Self(normalized))
    }

    /// Builds a code from separate resource and action segments.
    pub fn from_parts(resource: impl AsRef<str>, action: impl AsRef<str>) -> Result<Self> {
        Self::new(format!("{}:{}", resource.as_ref(), action.as_ref()))
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resource category, everything before the last `:`.
    pub fn resource(&self) -> &str {
        split_permission(&self.0).map_or("", |(resource, _)| resource)
    }

    /// Action verb, everything after the last `:`.
    pub fn action(&self) -> &str {
        split_permission(&self.0).map_or("", |(_, action)| action)
    }
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PermissionCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PermissionCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for PermissionCode {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for PermissionCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PermissionCode> for String {
    fn from(value: PermissionCode) -> Self {
        value.0
    }
}

fn validate(value: &str) -> Result<()> {
    let (resource, action) = split_permission(value).ok_or_else(|| {
        Error::InvalidPermission("permission must be in resource:action format".to_string())
    })?;
    if resource.is_empty() || action.is_empty() {
        return Err(Error::InvalidPermission(
            "permission must not have empty segments".to_string(),
        ));
    }
    for segment in resource.split(':') {
        if !is_valid_segment(segment) {
            return Err(Error::InvalidPermission(
                "resource segment contains invalid characters".to_string(),
            ));
        }
    }
    if !is_valid_segment(action) {
        return Err(Error::InvalidPermission(
            "action segment contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|ch| matches!(ch, 'a'..='z' | '0'..='9' | '_' | '-'))
}

fn split_permission(value: &str) -> Option<(&str, &str)> {
    value.rsplit_once(':')
}

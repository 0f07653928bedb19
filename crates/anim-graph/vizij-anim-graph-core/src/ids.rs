//! Named identifiers (bone masks, parameters, events) and resource ids.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Longest identifier accepted by [`StringId::validate`].
pub const MAX_ID_LENGTH: usize = 255;

/// A named identifier. The empty string means "unset".
///
/// Well-formedness is checked by [`StringId::validate`]; construction never fails so
/// that authoring data can hold work-in-progress values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringId(String);

impl StringId {
    pub const fn none() -> Self {
        StringId(String::new())
    }

    pub fn new(value: impl Into<String>) -> Self {
        StringId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_set(&self) -> bool {
        !self.0.is_empty()
    }

    /// True when the id is set and well formed.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Check the id is set, not padded with whitespace, free of control characters and
    /// not longer than [`MAX_ID_LENGTH`] bytes.
    pub fn validate(&self) -> Result<(), String> {
        if self.0.is_empty() {
            return Err("id is not set".to_string());
        }
        if self.0.len() > MAX_ID_LENGTH {
            return Err(format!("id is longer than {MAX_ID_LENGTH} bytes"));
        }
        if self.0.trim() != self.0 {
            return Err(format!("id '{}' has leading or trailing whitespace", self.0));
        }
        if self.0.chars().any(char::is_control) {
            return Err("id contains control characters".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<none>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl Borrow<str> for StringId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StringId {
    fn from(value: &str) -> Self {
        StringId::new(value)
    }
}

impl From<String> for StringId {
    fn from(value: String) -> Self {
        StringId(value)
    }
}

/// Scheme prefix shared by all resource ids.
pub const RESOURCE_SCHEME: &str = "data://";

/// Reference to an asset: `data://folder/.../name.ext`.
///
/// The extension names the resource type (`skel`, `ag`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    path: String,
    extension_start: usize,
}

impl ResourceId {
    /// Parse a resource path.
    pub fn parse(s: &str) -> Result<Self, String> {
        let Some(path) = s.strip_prefix(RESOURCE_SCHEME) else {
            return Err(format!("resource id '{s}' must start with '{RESOURCE_SCHEME}'"));
        };
        if path.is_empty() {
            return Err("resource id has an empty path".to_string());
        }
        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(format!("resource id '{s}' has an empty path segment"));
        }
        if path.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(format!("resource id '{s}' contains whitespace"));
        }
        let file = segments[segments.len() - 1];
        let Some((stem, extension)) = file.rsplit_once('.') else {
            return Err(format!("resource id '{s}' has no extension"));
        };
        if stem.is_empty() || extension.is_empty() {
            return Err(format!("resource id '{s}' has an invalid file name"));
        }
        let extension_start = s.len() - extension.len();
        Ok(ResourceId {
            path: s.to_string(),
            extension_start,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Resource type extension, without the dot.
    pub fn extension(&self) -> &str {
        &self.path[self.extension_start..]
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl FromStr for ResourceId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceId::parse(s)
    }
}

impl Serialize for ResourceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.path)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> Result<ResourceId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ResourceId::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_and_padded_ids_are_invalid() {
        assert!(!StringId::none().is_valid());
        assert!(!StringId::new(" Arms").is_valid());
        assert!(!StringId::new("Arms\n").is_valid());
        assert!(!StringId::new("a".repeat(MAX_ID_LENGTH + 1)).is_valid());
        assert!(StringId::new("Upper Body").is_valid());
    }

    #[test]
    fn parse_resource_id() {
        let id = ResourceId::parse("data://characters/biped/biped.skel").unwrap();
        assert_eq!(id.extension(), "skel");
        assert_eq!(id.to_string(), "data://characters/biped/biped.skel");
    }

    #[test]
    fn parse_rejects_malformed_resource_ids() {
        assert!(ResourceId::parse("characters/biped.skel").is_err());
        assert!(ResourceId::parse("data://").is_err());
        assert!(ResourceId::parse("data://a//b.skel").is_err());
        assert!(ResourceId::parse("data://biped").is_err());
        assert!(ResourceId::parse("data://my graph.ag").is_err());
        assert!(ResourceId::parse("data://.ag").is_err());
    }
}

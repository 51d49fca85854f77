//! Schema versioning utilities
//!
//! Registry versions are strictly `major.minor.patch`: three decimal
//! components, each fitting in a signed 32-bit integer, with no `v` prefix
//! and no pre-release or build suffix. Leading zeros are accepted and
//! normalized away, so `01.2.3` and `1.2.3` name the same version.
//! Consumers pin a `major.minor` [`SchemaTarget`] and follow its latest patch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SchemaError};

/// Largest value a single version component may take
pub const MAX_COMPONENT: u32 = i32::MAX as u32;

/// A registry schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    /// Create a version from components, rejecting components above [`MAX_COMPONENT`]
    pub fn new(major: u32, minor: u32, patch: u32) -> Result<Self> {
        for (field, value) in [("major", major), ("minor", minor), ("patch", patch)] {
            if value > MAX_COMPONENT {
                return Err(SchemaError::InvalidVersion {
                    version: format!("{}.{}.{}", major, minor, patch),
                    reason: format!("{} component {} does not fit in 32 bits", field, value),
                });
            }
        }
        Ok(Self { major, minor, patch })
    }

    /// Parse a version string (e.g. "1.2.3")
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: String| SchemaError::InvalidVersion {
            version: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(invalid("version is empty".to_string()));
        }
        // Rules out prefixes, signs, whitespace and pre-release/build suffixes up front
        if let Some(c) = input.chars().find(|c| !c.is_ascii_digit() && *c != '.') {
            return Err(invalid(format!("unexpected character '{}'", c)));
        }
        let arity = input.split('.').count();
        if arity != 3 {
            return Err(invalid(format!("expected 3 components, got {}", arity)));
        }

        let mut parts = input.split('.');
        let mut component = |field: &str| -> Result<u32> {
            let raw = parts.next().unwrap_or_default();
            if raw.is_empty() {
                return Err(invalid(format!("{} component is empty", field)));
            }
            raw.parse::<u32>()
                .ok()
                .filter(|v| *v <= MAX_COMPONENT)
                .ok_or_else(|| invalid(format!("{} component {} does not fit in 32 bits", field, raw)))
        };

        Ok(Self {
            major: component("major")?,
            minor: component("minor")?,
            patch: component("patch")?,
        })
    }

    /// Get the tag string (e.g., "v1.2.3")
    pub fn tag(&self) -> String {
        format!("v{}", self)
    }

    /// Whether this version belongs to the given `major.minor` line
    pub fn matches_target(&self, target: &SchemaTarget) -> bool {
        self.major == target.major && self.minor == target.minor
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<SchemaVersion> for String {
    fn from(v: SchemaVersion) -> Self {
        v.to_string()
    }
}

/// The `major.minor` line a consumer follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaTarget {
    pub major: u32,
    pub minor: u32,
}

impl SchemaTarget {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse a target string (e.g. "1.0")
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: String| SchemaError::InvalidTarget {
            target: input.to_string(),
            reason,
        };

        let (major, minor) = input
            .split_once('.')
            .ok_or_else(|| invalid("expected format 'Major.Minor'".to_string()))?;
        let component = |field: &str, raw: &str| -> Result<u32> {
            if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid(format!("{} '{}' is not a non-negative integer", field, raw)));
            }
            raw.parse::<u32>()
                .ok()
                .filter(|v| *v <= MAX_COMPONENT)
                .ok_or_else(|| invalid(format!("{} '{}' does not fit in 32 bits", field, raw)))
        };

        Ok(Self {
            major: component("major", major)?,
            minor: component("minor", minor)?,
        })
    }
}

impl fmt::Display for SchemaTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for SchemaTarget {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

//! Attribute paths
//!
//! A path addresses a field inside an attribute document. It renders as a
//! JSON Pointer (RFC 6901), which is also the wire format used by patch
//! operations. Dotted shorthand (`spec.replicas`) is accepted when parsing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Sequence of path segments, root being the empty sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributePath(Vec<String>);

impl AttributePath {
    /// The document root
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a JSON Pointer (`/spec/replicas`) or dotted path (`spec.replicas`)
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Ok(Self::root());
        }

        if let Some(pointer) = input.strip_prefix('/') {
            let segments = pointer
                .split('/')
                .map(|raw| unescape(raw, input))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self(segments));
        }

        if input.split('.').any(str::is_empty) {
            return Err(CoreError::InvalidPath {
                path: input.to_string(),
                reason: "empty segment in dotted path".to_string(),
            });
        }

        Ok(Self::new(input.split('.')))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, `None` for the root
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Path extended by one segment
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Prefix of the first `len` segments
    pub fn truncate(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    /// True when `self` equals `other` or is one of its ancestors
    pub fn is_prefix_of(&self, other: &AttributePath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// True when `self` is a strict ancestor of `other`
    pub fn is_ancestor_of(&self, other: &AttributePath) -> bool {
        self.0.len() < other.0.len() && self.is_prefix_of(other)
    }

    /// Segments of `self` below `ancestor`
    pub fn relative_to(&self, ancestor: &AttributePath) -> Option<&[String]> {
        if ancestor.is_prefix_of(self) {
            Some(&self.0[ancestor.0.len()..])
        } else {
            None
        }
    }

    /// Render as a JSON Pointer
    pub fn to_pointer(&self) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            out.push('/');
            out.push_str(&segment.replace('~', "~0").replace('/', "~1"));
        }
        out
    }
}

fn unescape(raw: &str, whole: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(CoreError::InvalidPath {
                    path: whole.to_string(),
                    reason: "'~' must be followed by '0' or '1'".to_string(),
                });
            }
        }
    }
    Ok(out)
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.to_pointer())
        }
    }
}

impl FromStr for AttributePath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for AttributePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_pointer())
    }
}

impl<'de> Deserialize<'de> for AttributePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

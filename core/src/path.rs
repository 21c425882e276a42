//! Path types.
//!
//! Two path notions appear in the pipeline and must not be confused:
//!
//! - [`RequestPath`] is the dot-path by which a nested node was reached in
//!   the original request (`"spaces.users"`). It is recorded during query
//!   enrichment and lets the post-hook walk find the matching selection
//!   without a second schema traversal.
//! - [`ObjPath`] is the instance-level path of a field slot: the parent
//!   chain of ids plus the field name (`"p1.spaces"`). The mutation
//!   pre-query indexes current linkage under these keys.

use std::fmt;

/// Dot-path of field names from the request root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RequestPath(Vec<String>);

impl RequestPath {
    /// The empty path (the request root).
    pub fn root() -> Self {
        Self::default()
    }

    /// Extend with one more field segment.
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    /// The path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True for the request root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse from dotted text. The empty string is the root.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            Self::root()
        } else {
            Self(text.split('.').map(|s| s.to_string()).collect())
        }
    }
}

impl fmt::Display for RequestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Instance-level path of a field slot: parent id chain plus field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ObjPath(Vec<String>);

impl ObjPath {
    /// The empty path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Extend with one more segment (an instance id or a field name).
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    /// The path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ObjPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

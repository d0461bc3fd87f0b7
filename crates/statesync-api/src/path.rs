// ── Store paths ──
//
// `/`-separated addresses into the remote tree. Segments are validated once
// at construction so every `Path` in the system is a legal store address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Characters the remote store refuses inside a single path segment.
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']', '/'];

/// A validated, absolute address into the remote tree.
///
/// The empty path is the root. Display form always starts with `/`
/// (`/games/g1/players`); parsing tolerates leading, trailing and repeated
/// slashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root of the tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `/`-separated path, validating every segment.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let mut segments = Vec::new();
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            validate_segment(segment).map_err(|reason| Error::InvalidPath {
                path: raw.to_owned(),
                reason,
            })?;
            segments.push(segment.to_owned());
        }
        Ok(Self { segments })
    }

    /// Append one segment.
    pub fn child(&self, segment: &str) -> Result<Self, Error> {
        validate_segment(segment).map_err(|reason| Error::InvalidPath {
            path: format!("{self}/{segment}"),
            reason,
        })?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_owned());
        Ok(Self { segments })
    }

    /// Concatenate two already-validated paths.
    pub fn join(&self, other: &Path) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.segments.split_last()?;
        Some(Self {
            segments: init.to_vec(),
        })
    }

    /// The final segment, or `None` at the root.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// `true` if `base` is this path or one of its ancestors.
    pub fn starts_with(&self, base: &Path) -> bool {
        self.segments.starts_with(&base.segments)
    }

    /// `true` if one path is an ancestor of (or equal to) the other, i.e.
    /// a write at one can change the document at the other.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

/// Check one segment against the store's naming rules.
///
/// Returns the human-readable reason on failure so callers can wrap it in
/// whichever error carries the most context.
pub fn validate_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("segment is empty".into());
    }
    if let Some(c) = segment.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(format!("segment contains forbidden character '{c}'"));
    }
    if segment.chars().any(char::is_control) {
        return Err("segment contains a control character".into());
    }
    Ok(())
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

//! Scene Paths
//!
//! [`ScenePath`] is the stable identifier of a node in the scene description:
//! an absolute, `/`-separated path such as `/World/Props/Chair`. The absolute
//! root is `/`.
//!
//! Paths are reference counted, so cloning one into a dependency set or a
//! work queue is a pointer copy. Ordering is plain lexical ordering of the
//! text, which the instancing pass relies on for deterministic tie-breaks.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::PathError;

const SEPARATOR: char = '/';

/// An absolute path to a node in the scene hierarchy.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScenePath(Arc<str>);

impl ScenePath {
    /// The absolute root `/`.
    #[must_use]
    pub fn root() -> Self {
        Self(Arc::from("/"))
    }

    /// Parses and validates absolute path text.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        validate_absolute(text)?;
        Ok(Self(Arc::from(text)))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        &*self.0 == "/"
    }

    /// The last path component. Empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(pos) => &self.0[pos + 1..],
            None => "",
        }
    }

    /// Number of components below the root (`/` is 0, `/A/B` is 2).
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.matches(SEPARATOR).count()
        }
    }

    /// The parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(SEPARATOR) {
            Some(0) => Some(Self::root()),
            Some(pos) => Some(Self(Arc::from(&self.0[..pos]))),
            None => None,
        }
    }

    /// Iterates strict ancestors, nearest first, ending with the root.
    pub fn ancestors(&self) -> impl Iterator<Item = ScenePath> {
        std::iter::successors(self.parent(), ScenePath::parent)
    }

    /// Appends one component.
    pub fn child(&self, name: &str) -> Result<Self, PathError> {
        if name.is_empty() || name.contains(SEPARATOR) {
            return Err(PathError::EmptyComponent(format!("{self}/{name}")));
        }
        Ok(self.join_unchecked(name))
    }

    /// True if `prefix` is this path or one of its ancestors.
    #[must_use]
    pub fn has_prefix(&self, prefix: &ScenePath) -> bool {
        if prefix.is_root() || self == prefix {
            return true;
        }
        self.0.len() > prefix.0.len()
            && self.0.starts_with(&*prefix.0)
            && self.0.as_bytes()[prefix.0.len()] == b'/'
    }

    /// The path of `self` relative to `anchor`, or `None` if `anchor` is not
    /// a prefix. Equal paths yield an empty relative path.
    #[must_use]
    pub fn relative_to(&self, anchor: &ScenePath) -> Option<&str> {
        if !self.has_prefix(anchor) {
            return None;
        }
        if self == anchor {
            return Some("");
        }
        if anchor.is_root() {
            return Some(&self.0[1..]);
        }
        Some(&self.0[anchor.0.len() + 1..])
    }

    /// Joins a relative path produced by [`relative_to`](Self::relative_to).
    pub fn join_relative(&self, relative: &str) -> Result<Self, PathError> {
        if relative.is_empty() {
            return Ok(self.clone());
        }
        if relative.starts_with(SEPARATOR) {
            return Err(PathError::NotRelative(relative.to_string()));
        }
        if relative.split(SEPARATOR).any(str::is_empty) {
            return Err(PathError::EmptyComponent(relative.to_string()));
        }
        Ok(self.join_unchecked(relative))
    }

    fn join_unchecked(&self, tail: &str) -> Self {
        if self.is_root() {
            Self(Arc::from(format!("/{tail}")))
        } else {
            Self(Arc::from(format!("{}/{tail}", self.0)))
        }
    }
}

fn validate_absolute(text: &str) -> Result<(), PathError> {
    if text.is_empty() {
        return Err(PathError::Empty);
    }
    if !text.starts_with(SEPARATOR) {
        return Err(PathError::NotAbsolute(text.to_string()));
    }
    if text == "/" {
        return Ok(());
    }
    if text[1..].split(SEPARATOR).any(str::is_empty) {
        return Err(PathError::EmptyComponent(text.to_string()));
    }
    Ok(())
}

impl fmt::Display for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScenePath({})", self.0)
    }
}

impl FromStr for ScenePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ScenePath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ScenePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_absolute(&value)?;
        Ok(Self(Arc::from(value)))
    }
}

impl From<ScenePath> for String {
    fn from(path: ScenePath) -> Self {
        path.0.to_string()
    }
}

impl AsRef<str> for ScenePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

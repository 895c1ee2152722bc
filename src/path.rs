//! Namespace paths.
//!
//! A [`NamespacePath`] is a non-empty sequence of identifier segments. The
//! canonical form is dot-joined (`a.b.c`); the slash form (`/a/b/c`) used by
//! request URLs parses to the same path. Ancestry is strict segment-prefix
//! ordering.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Segment storage; most namespaces are shallower than this.
pub const MAX_INLINE_SEGMENTS: usize = 8;

static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid segment regex")
});

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacePath {
    segments: SmallVec<[String; MAX_INLINE_SEGMENTS]>,
}

impl NamespacePath {
    /// Parse a dotted (`a.b.c`) or slash-separated (`/a/b/c`) path.
    pub fn parse(raw: &str) -> Result<Self> {
        let separator = if raw.contains('/') { '/' } else { '.' };
        let trimmed = raw.trim_matches(separator);
        if trimmed.is_empty() {
            return Err(Error::InvalidPath {
                path: raw.to_string(),
                reason: "path is empty".to_string(),
            });
        }
        Self::from_segments(trimmed.split(separator))
    }

    /// Build a path from individual segments, validating each one.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: SmallVec<[String; MAX_INLINE_SEGMENTS]> = SmallVec::new();
        for seg in segments {
            let seg = seg.as_ref();
            if !SEGMENT_RE.is_match(seg) {
                return Err(Error::InvalidPath {
                    path: seg.to_string(),
                    reason: format!("'{seg}' is not a valid identifier segment"),
                });
            }
            out.push(seg.to_string());
        }
        if out.is_empty() {
            return Err(Error::InvalidPath {
                path: String::new(),
                reason: "path is empty".to_string(),
            });
        }
        Ok(Self { segments: out })
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments (the "depth" reported by binding resolution).
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; paths are non-empty by construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Final segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    #[must_use]
    pub fn parent(&self) -> Option<NamespacePath> {
        self.prefix(self.len().checked_sub(1)?)
    }

    /// The first `n` segments, or `None` when `n` is zero or out of range.
    #[must_use]
    pub fn prefix(&self, n: usize) -> Option<NamespacePath> {
        if n == 0 || n > self.len() {
            return None;
        }
        Some(Self {
            segments: self.segments[..n].iter().cloned().collect(),
        })
    }

    /// Append one segment.
    pub fn child(&self, segment: &str) -> Result<NamespacePath> {
        let mut next = self.clone();
        next.push_segments(std::iter::once(segment))?;
        Ok(next)
    }

    /// Append a relative dotted or slashed sub-path.
    pub fn join(&self, relative: &str) -> Result<NamespacePath> {
        let rel = NamespacePath::parse(relative)?;
        Ok(self.concat(&rel))
    }

    /// Append already-validated segments from another path.
    #[must_use]
    pub fn concat(&self, other: &NamespacePath) -> NamespacePath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    fn push_segments<'a>(&mut self, segs: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let extra = NamespacePath::from_segments(segs)?;
        self.segments.extend(extra.segments);
        Ok(())
    }

    /// Proper ancestors from the longest (parent) down to the first segment.
    pub fn ancestors(&self) -> impl Iterator<Item = NamespacePath> + '_ {
        (1..self.len()).rev().filter_map(move |n| self.prefix(n))
    }

    /// `self` is a strict prefix of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &NamespacePath) -> bool {
        self.len() < other.len() && other.segments.starts_with(&self.segments)
    }

    /// Segments of `self` below `ancestor`; `None` unless `ancestor` is a prefix
    /// (or equal).
    #[must_use]
    pub fn suffix_below(&self, ancestor: &NamespacePath) -> Option<&[String]> {
        if self.segments.starts_with(&ancestor.segments) {
            Some(&self.segments[ancestor.len()..])
        } else {
            None
        }
    }

    /// Slash-joined form, used for reduced introspection labels.
    #[must_use]
    pub fn to_slashed(&self) -> String {
        self.segments.join("/")
    }
}

/// Anything that names a namespace path: `&str` in dotted or slash form, or
/// an already parsed [`NamespacePath`].
pub trait ToNamespacePath {
    fn to_namespace_path(&self) -> Result<NamespacePath>;
}

impl ToNamespacePath for str {
    fn to_namespace_path(&self) -> Result<NamespacePath> {
        NamespacePath::parse(self)
    }
}

impl ToNamespacePath for String {
    fn to_namespace_path(&self) -> Result<NamespacePath> {
        NamespacePath::parse(self)
    }
}

impl ToNamespacePath for NamespacePath {
    fn to_namespace_path(&self) -> Result<NamespacePath> {
        Ok(self.clone())
    }
}

impl Display for NamespacePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl std::fmt::Debug for NamespacePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "NamespacePath({self})")
    }
}

impl FromStr for NamespacePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NamespacePath::parse(s)
    }
}

impl TryFrom<&str> for NamespacePath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        NamespacePath::parse(s)
    }
}

impl Serialize for NamespacePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NamespacePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NamespacePath::parse(&s).map_err(serde::de::Error::custom)
    }
}

//! Request identifiers.
//!
//! Every dispatched request carries a [`RequestId`] so that resolution steps,
//! handler logs and the injected request details can be correlated.

use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};

/// ULID-backed identifier of one dispatched request.
///
/// Ids sort by creation time; they serialise as their canonical 26 character
/// text so injected request details stay readable.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(ulid::Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Reuse an identifier supplied by the transport (e.g. an `X-Request-Id`
    /// header); anything unparsable gets a fresh one.
    #[must_use]
    pub fn parse_or_new(supplied: Option<&str>) -> Self {
        match supplied.map(|s| ulid::Ulid::from_string(s.trim())) {
            Some(Ok(id)) => Self(id),
            _ => Self::new(),
        }
    }

    #[must_use]
    pub fn ulid(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

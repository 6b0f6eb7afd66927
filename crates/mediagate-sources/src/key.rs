use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The error returned when a raw filename does not form a valid [`ObjectKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid object key {key:?}: {reason}")]
pub struct InvalidObjectKey {
    pub(crate) key: String,
    pub(crate) reason: &'static str,
}

impl InvalidObjectKey {
    fn new(key: &str, reason: &'static str) -> Self {
        Self {
            key: key.to_owned(),
            reason,
        }
    }
}

/// A validated media object key.
///
/// The key doubles as the file name inside the local cache directory, so it is
/// restricted to a single path segment: no separators, no `.`/`..`, no NUL
/// bytes. Constructing an `ObjectKey` is the only way a request-supplied
/// filename enters the cache layer, which rules out path traversal at the
/// type level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validates `raw` as a single path segment and wraps it.
    pub fn new(raw: &str) -> Result<Self, InvalidObjectKey> {
        if raw.is_empty() {
            return Err(InvalidObjectKey::new(raw, "empty"));
        }
        if raw == "." || raw == ".." {
            return Err(InvalidObjectKey::new(raw, "directory reference"));
        }
        if raw.contains(['/', '\\']) {
            return Err(InvalidObjectKey::new(raw, "contains a path separator"));
        }
        if raw.contains('\0') {
            return Err(InvalidObjectKey::new(raw, "contains a NUL byte"));
        }
        Ok(Self(raw.to_owned()))
    }

    /// Deref the [`ObjectKey`] to a `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The file extension of the key, if any.
    pub fn extension(&self) -> Option<&str> {
        match self.0.rsplit_once('.') {
            Some(("", _)) | None => None,
            Some((_, ext)) => Some(ext),
        }
    }
}

impl FromStr for ObjectKey {
    type Err = InvalidObjectKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for ObjectKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! OriginTag: identifies the running client that sent a replication message.
//!
//! Generated once per process and kept across channel reconnects. A tab
//! drops any inbound message carrying its own tag.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginTagError {
    #[error("Origin tag must not be empty")]
    Empty,
}

/// Unique tag for one running client instance.
///
/// Freshly generated tags are UUIDs, but any non-empty string is accepted
/// when parsing so that tabs built by other clients interoperate.
///
/// # Examples
/// ```
/// use notes_core::OriginTag;
///
/// let tag = OriginTag::generate();
/// let parsed: OriginTag = tag.to_string().parse().unwrap();
/// assert_eq!(tag, parsed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginTag(String);

impl OriginTag {
    /// Generate a new random tag.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OriginTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OriginTag {
    type Err = OriginTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(OriginTagError::Empty);
        }
        Ok(Self(s.to_string()))
    }
}

impl serde::Serialize for OriginTag {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for OriginTag {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

//! Entity identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Group lengths of the canonical hyphenated UUID form.
const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

/// Identifier of a dog record.
///
/// Parsing is strict: only the canonical 8-4-4-4-12 hexadecimal form is
/// accepted. Braced, URN and simple (unhyphenated) forms are rejected even
/// though `Uuid::parse_str` would take them, because the id is used verbatim
/// as a storage folder name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DogId(Uuid);

impl DogId {
    /// Generate a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse the canonical hyphenated form.
    pub fn parse_strict(s: &str) -> crate::Result<Self> {
        if !is_canonical_uuid(s) {
            return Err(crate::Error::InvalidDogId(format!(
                "expected 8-4-4-4-12 hexadecimal form, got {s:?}"
            )));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidDogId(e.to_string()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Folder prefix under which this dog's media lives in a bucket.
    pub fn folder_prefix(&self) -> String {
        format!("{}/", self.0)
    }
}

fn is_canonical_uuid(s: &str) -> bool {
    let mut groups = s.split('-');
    for expected in GROUPS {
        match groups.next() {
            Some(g) if g.len() == expected && g.bytes().all(|b| b.is_ascii_hexdigit()) => {}
            _ => return false,
        }
    }
    groups.next().is_none()
}

impl Default for DogId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for DogId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for DogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DogId({})", self.0)
    }
}

impl fmt::Display for DogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

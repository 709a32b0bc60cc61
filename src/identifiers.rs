//! Identifier types for fragments and composite types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a fragment or composite type within a composition graph
///
/// Every fragment and every composite type receives a `FragmentId` when it is
/// built. Membership testing is a lookup against the set of ids that
/// participated in a type's definition, so identity (not structure) is what
/// makes two fragments "the same" constituent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentId(Uuid);

impl FragmentId {
    /// Create a new random fragment ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from a UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FragmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for FragmentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<FragmentId> for Uuid {
    fn from(id: FragmentId) -> Self {
        id.0
    }
}

impl From<&FragmentId> for Uuid {
    fn from(id: &FragmentId) -> Self {
        id.0
    }
}

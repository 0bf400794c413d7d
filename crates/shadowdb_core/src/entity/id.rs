//! Entity identifier.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use shadowdb_storage::SqlValue;
use std::fmt;

/// Identifier of an entity, shared with the source of truth.
///
/// Entity IDs are:
/// - Assigned by the source of truth, never by the shadow store
/// - Immutable once an entity is constructed
/// - Ordered, so migration pages are stable
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an entity ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the ID as a signed SQL integer, or `None` above `i64::MAX`.
    #[must_use]
    pub fn as_i64(self) -> Option<i64> {
        i64::try_from(self.0).ok()
    }

    /// Creates an entity ID from a SQL integer. Negative values are rejected.
    #[must_use]
    pub fn from_i64(id: i64) -> Option<Self> {
        u64::try_from(id).ok().map(Self)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Binding an ID that a SQL integer column cannot hold is an error.
impl TryFrom<EntityId> for SqlValue {
    type Error = CoreError;

    fn try_from(id: EntityId) -> CoreResult<Self> {
        id.as_i64().map(SqlValue::Integer).ok_or_else(|| {
            CoreError::invalid_operation(format!("entity id {id} exceeds the largest storable id"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(EntityId::new(1) < EntityId::new(2));
    }

    #[test]
    fn signed_conversion() {
        assert_eq!(EntityId::from_i64(7), Some(EntityId::new(7)));
        assert_eq!(EntityId::from_i64(-1), None);
        assert_eq!(EntityId::new(u64::MAX).as_i64(), None);
    }

    #[test]
    fn oversized_ids_are_not_bound() {
        let largest = EntityId::new(i64::MAX as u64);
        assert_eq!(SqlValue::try_from(largest).unwrap(), SqlValue::Integer(i64::MAX));
        assert!(matches!(
            SqlValue::try_from(EntityId::new(i64::MAX as u64 + 1)),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", EntityId::new(42)), "42");
        assert_eq!(format!("{:?}", EntityId::new(42)), "EntityId(42)");
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&EntityId::new(9)).unwrap();
        assert_eq!(json, "9");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EntityId::new(9));
    }
}

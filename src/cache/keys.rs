//! Cache key construction
//!
//! Each namespace owns a tracking set listing its live data keys.
//! Invalidation deletes exactly the keys readers registered, never a
//! keyspace scan.

use std::fmt;

use crate::types::EntityTable;

/// A logical cache namespace, one per domain table's read views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Users,
    Orders,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Users => "users",
            Namespace::Orders => "orders",
        }
    }

    /// Key of the set tracking this namespace's live cache keys
    pub fn tracking_set(&self) -> String {
        format!("tracked:{}", self.as_str())
    }

    /// Data key for a paginated list view
    pub fn list_key(&self, limit: i64, offset: i64) -> String {
        format!("{}:list:{}:{}", self.as_str(), limit, offset)
    }

    /// Data key for a single entity view
    pub fn entity_key(&self, id: &uuid::Uuid) -> String {
        format!("{}:id:{}", self.as_str(), id)
    }
}

impl From<EntityTable> for Namespace {
    fn from(table: EntityTable) -> Self {
        match table {
            EntityTable::Users => Namespace::Users,
            EntityTable::Orders => Namespace::Orders,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_tracking_set_key() {
        assert_eq!(Namespace::Users.tracking_set(), "tracked:users");
        assert_eq!(Namespace::Orders.tracking_set(), "tracked:orders");
    }

    #[test]
    fn test_list_key_includes_pagination() {
        assert_eq!(Namespace::Users.list_key(20, 0), "users:list:20:0");
        assert_ne!(
            Namespace::Users.list_key(20, 0),
            Namespace::Users.list_key(20, 20)
        );
    }

    #[test]
    fn test_entity_key() {
        let id = Uuid::nil();
        assert_eq!(
            Namespace::Orders.entity_key(&id),
            format!("orders:id:{}", id)
        );
    }

    #[test]
    fn test_namespace_from_table() {
        assert_eq!(Namespace::from(EntityTable::Users), Namespace::Users);
        assert_eq!(Namespace::from(EntityTable::Orders), Namespace::Orders);
    }
}

//! Runtime registry of user-defined type OIDs.
//!
//! Built-in types have fixed OIDs known at compile time; composite types
//! created with `CREATE TYPE` get their OIDs assigned by the server and must
//! be looked up from `pg_type` before they can be sent as parameters.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::protocol::types::Oid;

/// The pair of OIDs a registered type carries: its own and its 1-D array
/// type's (`pg_type.oid` and `pg_type.typarray`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdtOids {
    pub oid: Oid,
    pub array_oid: Oid,
}

/// Maps registered type names to their OIDs.
///
/// Starts empty; entries are added by [`OidMap::register`], either directly
/// by the caller or by the connection's automatic `pg_type` lookup.
#[derive(Debug, Clone, Default)]
pub struct OidMap {
    entries: HashMap<&'static str, UdtOids>,
}

impl OidMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Register a type name with its OID pair.
    pub fn register(&mut self, name: &'static str, oid: Oid, array_oid: Oid) {
        self.entries.insert(name, UdtOids { oid, array_oid });
    }

    /// OID of a registered type.
    pub fn oid_of(&self, name: &str) -> Result<Oid> {
        self.lookup(name).map(|e| e.oid)
    }

    /// OID of the array type over a registered element type.
    pub fn array_oid_of(&self, name: &str) -> Result<Oid> {
        self.lookup(name).map(|e| e.array_oid)
    }

    fn lookup(&self, name: &str) -> Result<UdtOids> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownOid(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut map = OidMap::new();
        assert!(!map.contains("point_xy"));
        assert!(matches!(map.oid_of("point_xy"), Err(Error::UnknownOid(_))));

        map.register("point_xy", 600_001, 600_002);
        assert!(map.contains("point_xy"));
        assert_eq!(map.oid_of("point_xy").unwrap(), 600_001);
        assert_eq!(map.array_oid_of("point_xy").unwrap(), 600_002);
    }
}

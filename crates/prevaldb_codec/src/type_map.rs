//! Type-identifier substitution.

use std::collections::HashMap;

/// Remaps stored type identifiers to current ones.
///
/// Journal creation markers and snapshot headers record the identifier
/// of the model type they were written with. When a type is renamed or
/// moved to another module, a `TypeMap` lets existing stores open
/// against the new type without rewriting history.
///
/// # Example
///
/// ```
/// use prevaldb_codec::TypeMap;
///
/// let mut map = TypeMap::new();
/// map.insert("old_crate::Ledger", "accounting::Ledger");
/// assert_eq!(map.remap("old_crate::Ledger"), "accounting::Ledger");
/// assert_eq!(map.remap("accounting::Ledger"), "accounting::Ledger");
/// ```
#[derive(Debug, Default, Clone)]
pub struct TypeMap {
    entries: HashMap<String, String>,
}

impl TypeMap {
    /// Creates an empty type map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a substitution from a stored identifier to the current
    /// one. A later insert for the same stored identifier replaces the
    /// earlier target.
    pub fn insert(&mut self, stored: impl Into<String>, current: impl Into<String>) {
        self.entries.insert(stored.into(), current.into());
    }

    /// Resolves a stored identifier.
    ///
    /// Identifiers without a registered substitution pass through
    /// unchanged.
    #[must_use]
    pub fn remap<'a>(&'a self, stored: &'a str) -> &'a str {
        self.entries.get(stored).map_or(stored, String::as_str)
    }

    /// Returns whether the map has no substitutions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

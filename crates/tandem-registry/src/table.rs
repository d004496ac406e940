//! Id-keyed reference tables.

use std::collections::HashMap;
use std::fmt;

use crate::error::RegistryError;
use crate::module::ModuleId;

/// A table mapping stable ids to one side's resolution of them.
///
/// Tables are filled at startup and only read afterwards, so a frozen
/// table is shared across requests without locking.
pub struct ReferenceTable<T> {
    name: &'static str,
    entries: HashMap<ModuleId, T>,
    order: Vec<ModuleId>,
}

impl<T> ReferenceTable<T> {
    /// Create an empty table. `name` appears in errors and logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Table name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register `value` under `id`. Ids are unique per table.
    pub fn insert(&mut self, id: impl Into<ModuleId>, value: T) -> Result<(), RegistryError> {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return Err(RegistryError::Duplicate {
                table: self.name,
                id: id.to_string(),
            });
        }
        tracing::trace!(table = self.name, id = %id, "reference registered");
        self.order.push(id.clone());
        self.entries.insert(id, value);
        Ok(())
    }

    /// Look up `id`, failing with `Unknown` when absent.
    pub fn resolve(&self, id: &str) -> Result<&T, RegistryError> {
        self.entries
            .get(&ModuleId::new(id))
            .ok_or_else(|| RegistryError::Unknown {
                table: self.name,
                id: id.to_string(),
            })
    }

    /// Look up `id`.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(&ModuleId::new(id))
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(&ModuleId::new(id))
    }

    /// Ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.order.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> fmt::Debug for ReferenceTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceTable")
            .field("name", &self.name)
            .field("ids", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_resolve() {
        let mut table = ReferenceTable::new("test");
        table.insert("a#X", 1).unwrap();
        table.insert("b#Y", 2).unwrap();

        assert_eq!(*table.resolve("a#X").unwrap(), 1);
        assert_eq!(table.get("b#Y"), Some(&2));
        assert!(table.contains("a#X"));
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.ids().map(ModuleId::as_str).collect::<Vec<_>>(),
            vec!["a#X", "b#Y"]
        );
    }

    #[test]
    fn test_unknown_id() {
        let table: ReferenceTable<()> = ReferenceTable::new("client");
        assert_eq!(
            table.resolve("nope#Nope").unwrap_err(),
            RegistryError::Unknown {
                table: "client",
                id: "nope#Nope".into()
            }
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut table = ReferenceTable::new("server");
        table.insert("a#X", ()).unwrap();
        assert!(matches!(
            table.insert("a#X", ()),
            Err(RegistryError::Duplicate { .. })
        ));
    }
}

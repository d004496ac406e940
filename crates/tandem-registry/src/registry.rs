//! Server-side registry bundling the client and server-function tables.

use std::collections::BTreeMap;

use crate::error::RegistryError;
use crate::module::{ModuleId, ModuleReference};
use crate::server_fn::ServerFunction;
use crate::table::ReferenceTable;

/// Tables the server consults while rendering and invoking actions.
///
/// Populated at process start (normally from the build manifest) and then
/// shared read-only by every request.
#[derive(Debug)]
pub struct ModuleRegistry {
    client: ReferenceTable<ModuleReference>,
    server: ReferenceTable<ServerFunction>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// Create empty tables.
    pub fn new() -> Self {
        Self {
            client: ReferenceTable::new("client"),
            server: ReferenceTable::new("server"),
        }
    }

    /// Register a client module reference.
    pub fn client_module(&mut self, reference: ModuleReference) -> Result<&mut Self, RegistryError> {
        self.client.insert(reference.id.clone(), reference)?;
        Ok(self)
    }

    /// Register a server function under `id`.
    pub fn server_fn(
        &mut self,
        id: impl Into<ModuleId>,
        function: ServerFunction,
    ) -> Result<&mut Self, RegistryError> {
        self.server.insert(id, function)?;
        Ok(self)
    }

    /// Load client references from a build manifest.
    ///
    /// The manifest is a JSON object keyed by module id:
    /// `{"btn#Counter": {"id": "btn#Counter", "exportName": "Counter", "chunkIds": []}}`.
    pub fn load_client_manifest(&mut self, json: &str) -> Result<&mut Self, RegistryError> {
        let manifest: BTreeMap<String, ModuleReference> =
            serde_json::from_str(json).map_err(|e| RegistryError::Manifest(e.to_string()))?;
        for (key, reference) in manifest {
            if key != reference.id.as_str() {
                return Err(RegistryError::Manifest(format!(
                    "entry '{}' declares id '{}'",
                    key, reference.id
                )));
            }
            self.client_module(reference)?;
        }
        Ok(self)
    }

    /// Resolve a client-boundary module id.
    pub fn client_reference(&self, id: &str) -> Result<&ModuleReference, RegistryError> {
        self.client.resolve(id)
    }

    /// Resolve a server function id.
    pub fn server_function(&self, id: &str) -> Result<&ServerFunction, RegistryError> {
        self.server.resolve(id)
    }

    /// Client reference table.
    pub fn client_table(&self) -> &ReferenceTable<ModuleReference> {
        &self.client
    }

    /// Server function table.
    pub fn server_table(&self) -> &ReferenceTable<ServerFunction> {
        &self.server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_and_server_tables_are_separate() {
        let mut registry = ModuleRegistry::new();
        registry
            .client_module(ModuleReference::new("btn#Counter", "Counter"))
            .unwrap()
            .server_fn(
                "actions#increment",
                ServerFunction::unary("increment", |n: i64| async move { Ok(n + 1) }),
            )
            .unwrap();

        assert!(registry.client_reference("btn#Counter").is_ok());
        assert!(registry.server_function("btn#Counter").is_err());
        assert!(registry.server_function("actions#increment").is_ok());
        assert!(registry.client_reference("actions#increment").is_err());
    }

    #[test]
    fn test_load_manifest() {
        let mut registry = ModuleRegistry::new();
        registry
            .load_client_manifest(
                r#"{
                    "btn#Counter": {"id": "btn#Counter", "exportName": "Counter", "chunkIds": ["c1"]},
                    "nav#Menu": {"id": "nav#Menu", "exportName": "Menu"}
                }"#,
            )
            .unwrap();

        let counter = registry.client_reference("btn#Counter").unwrap();
        assert_eq!(counter.chunk_ids, vec!["c1"]);
        assert!(registry.client_reference("nav#Menu").unwrap().chunk_ids.is_empty());
        assert_eq!(registry.client_table().len(), 2);
    }

    #[test]
    fn test_manifest_key_mismatch() {
        let mut registry = ModuleRegistry::new();
        let err = registry
            .load_client_manifest(r#"{"a#A": {"id": "b#B", "exportName": "B"}}"#)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Manifest(_)));
    }

    #[test]
    fn test_manifest_malformed() {
        let mut registry = ModuleRegistry::new();
        assert!(matches!(
            registry.load_client_manifest("not json"),
            Err(RegistryError::Manifest(_))
        ));
    }
}

//! Module identifiers and references.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a module export.
///
/// Derived from the module's source location and export name, so the same
/// source module and export always yield the same id within a build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id for `export` of the module at `source_path`.
    ///
    /// Leading `./` and backslashes are normalized so that ids do not
    /// depend on how the build tool spelled the path.
    pub fn from_source(source_path: &str, export: &str) -> Self {
        let path = source_path.replace('\\', "/");
        let path = path.trim_start_matches("./");
        Self(format!("{}#{}", path, export))
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Export name encoded in the id, if any.
    pub fn export_name(&self) -> Option<&str> {
        self.0.rsplit_once('#').map(|(_, export)| export)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Reference to a client module, as carried in `reference` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReference {
    /// Stable module id.
    pub id: ModuleId,
    /// Export to use from the module.
    pub export_name: String,
    /// Code chunks the client must load before evaluating the module.
    #[serde(default)]
    pub chunk_ids: Vec<String>,
}

impl ModuleReference {
    /// Reference for `export` of the module at `source_path`.
    pub fn from_source(source_path: &str, export: &str) -> Self {
        Self {
            id: ModuleId::from_source(source_path, export),
            export_name: export.to_string(),
            chunk_ids: Vec::new(),
        }
    }

    /// Reference with an explicit id.
    pub fn new(id: impl Into<ModuleId>, export_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            export_name: export_name.into(),
            chunk_ids: Vec::new(),
        }
    }

    /// Add a chunk dependency.
    pub fn with_chunk(mut self, chunk: impl Into<String>) -> Self {
        self.chunk_ids.push(chunk.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_from_source_is_stable() {
        let a = ModuleId::from_source("./src/components/button.rs", "Counter");
        let b = ModuleId::from_source("src\\components\\button.rs", "Counter");

        assert_eq!(a, b);
        assert_eq!(a.as_str(), "src/components/button.rs#Counter");
        assert_eq!(a.export_name(), Some("Counter"));
    }

    #[test]
    fn test_module_id_without_export() {
        let id = ModuleId::new("plain");
        assert_eq!(id.export_name(), None);
        assert_eq!(id.to_string(), "plain");
    }

    #[test]
    fn test_reference_serialization() {
        let reference = ModuleReference::new("btn#Counter", "Counter").with_chunk("chunk-1");
        let json = serde_json::to_value(&reference).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "id": "btn#Counter",
                "exportName": "Counter",
                "chunkIds": ["chunk-1"]
            })
        );
        let back: ModuleReference = serde_json::from_value(json).unwrap();
        assert_eq!(back, reference);
    }
}

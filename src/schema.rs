// Schema registry for relationship field declarations
//
// This module holds the declared relationship fields of every resource type. The registry is
// an explicit handle passed to each Graph, so independent graphs can run against independent
// schemas.

use crate::error::GraphError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipKind {
    /// Cardinality one.
    BelongsTo,
    /// Cardinality many.
    HasMany,
}

impl RelationshipKind {
    pub fn is_collection(&self) -> bool {
        matches!(self, RelationshipKind::HasMany)
    }
}

/// One declared relationship field on a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipField {
    pub name: String,
    pub kind: RelationshipKind,
    #[serde(rename = "type")]
    pub related_type: String,
    /// The field on `related_type` pointing back here. `None` means no inverse is declared.
    #[serde(default)]
    pub inverse: Option<String>,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default)]
    pub polymorphic: bool,
    #[serde(default)]
    pub paginated: bool,
    /// Whether a remote change resets the local value. Unset falls back to the graph config.
    #[serde(default)]
    pub reset_on_remote_update: Option<bool>,
    /// The abstract type this field's owner stands in for on the inverse side of a polymorphic
    /// relationship.
    #[serde(default, rename = "as")]
    pub conforms_to: Option<String>,
}

impl RelationshipField {
    pub fn belongs_to(name: &str, related_type: &str) -> Self {
        RelationshipField::new(name, RelationshipKind::BelongsTo, related_type)
    }

    pub fn has_many(name: &str, related_type: &str) -> Self {
        RelationshipField::new(name, RelationshipKind::HasMany, related_type)
    }

    fn new(name: &str, kind: RelationshipKind, related_type: &str) -> Self {
        RelationshipField {
            name: name.to_string(),
            kind,
            related_type: related_type.to_string(),
            inverse: None,
            is_async: false,
            polymorphic: false,
            paginated: false,
            reset_on_remote_update: None,
            conforms_to: None,
        }
    }

    pub fn inverse(mut self, inverse: &str) -> Self {
        self.inverse = Some(inverse.to_string());
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    pub fn paginated(mut self) -> Self {
        self.paginated = true;
        self
    }

    pub fn reset_on_remote_update(mut self, reset: bool) -> Self {
        self.reset_on_remote_update = Some(reset);
        self
    }

    pub fn conforms_to(mut self, abstract_type: &str) -> Self {
        self.conforms_to = Some(abstract_type.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    #[serde(default)]
    pub relationships: Vec<RelationshipField>,
}

impl ResourceSchema {
    pub fn new(relationships: Vec<RelationshipField>) -> Self {
        ResourceSchema { relationships }
    }

    pub fn field(&self, name: &str) -> Option<&RelationshipField> {
        self.relationships.iter().find(|field| field.name == name)
    }
}

/// Thread-safe registry of resource schemas, keyed by resource type.
///
/// Clones share the same underlying table.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry(Arc<RwLock<HashMap<String, Arc<ResourceSchema>>>>);

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    /// Register a resource schema
    ///
    /// If a schema for this type already exists, it will be overwritten and a log message emitted.
    /// Definitions already resolved by a graph are not recomputed.
    pub fn register(&self, type_name: &str, schema: ResourceSchema) {
        let mut writer = self.0.write();
        if writer.contains_key(type_name) {
            tracing::info!(
                "[SchemaRegistry::register] Overwriting existing schema: {}",
                type_name
            );
        }
        writer.insert(type_name.to_string(), Arc::new(schema));
    }

    /// Register a schema from its TOML form: a list of `[[relationships]]` tables.
    pub fn register_toml(&self, type_name: &str, toml_str: &str) -> Result<(), GraphError> {
        let schema: ResourceSchema = toml::from_str(toml_str)?;
        self.register(type_name, schema);
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<ResourceSchema>> {
        self.0.read().get(type_name).cloned()
    }

    pub fn field(&self, type_name: &str, field: &str) -> Option<RelationshipField> {
        self.get(type_name)
            .and_then(|schema| schema.field(field).cloned())
    }

    pub fn list_schemas(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }
}

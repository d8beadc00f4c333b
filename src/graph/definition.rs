//! Edge definitions: the static, schema-level shape of a relationship.
//!
//! [`DefinitionResolver`] derives one [`EdgeDefinition`] per `(resource type, field)` and caches
//! it for the lifetime of the resolver. Declared inverses are cross-linked when either side is
//! first resolved. A field without a declared inverse gets a synthesized implicit counterpart on
//! the related type, stored under [`implicit_key`], so every edge has exactly one inverse to keep
//! up to date.

use parking_lot::RwLock;
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    fmt::{Display, Formatter},
    sync::Arc,
};

use crate::{
    error::GraphError,
    schema::{RelationshipField, RelationshipKind, SchemaRegistry},
};

pub const IMPLICIT_KEY_PREFIX: &str = "implicit-";

/// Namespaced key of the implicit counterpart of `type_name.field`.
pub fn implicit_key(type_name: &str, field: &str) -> String {
    format!("{IMPLICIT_KEY_PREFIX}{type_name}:{field}")
}

pub fn is_implicit_key(field: &str) -> bool {
    field.starts_with(IMPLICIT_KEY_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EdgeKind {
    /// Cardinality one
    Resource,
    /// Cardinality many, ordered
    Collection,
    /// Unordered back-references for a field that declares no inverse
    Implicit,
}

impl Display for EdgeKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            EdgeKind::Resource => write!(f, "resource"),
            EdgeKind::Collection => write!(f, "collection"),
            EdgeKind::Implicit => write!(f, "implicit"),
        }
    }
}

impl From<RelationshipKind> for EdgeKind {
    fn from(kind: RelationshipKind) -> Self {
        match kind {
            RelationshipKind::BelongsTo => EdgeKind::Resource,
            RelationshipKind::HasMany => EdgeKind::Collection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeDefinition {
    pub kind: EdgeKind,
    /// The type the field is declared on (the polymorphic base for concrete members).
    pub base_type: String,
    pub field_name: String,
    pub related_type: String,
    pub inverse_field_name: String,
    pub inverse_kind: EdgeKind,
    pub inverse_is_async: bool,
    pub inverse_is_implicit: bool,
    pub inverse_is_polymorphic: bool,
    pub is_async: bool,
    pub is_collection: bool,
    pub is_polymorphic: bool,
    pub is_implicit: bool,
    pub is_paginated: bool,
    pub reset_on_remote_update: Option<bool>,
}

impl EdgeDefinition {
    fn declared(
        base_type: &str,
        field: &RelationshipField,
        inverse_field_name: String,
        inverse_kind: EdgeKind,
        inverse: Option<&RelationshipField>,
    ) -> EdgeDefinition {
        EdgeDefinition {
            kind: field.kind.into(),
            base_type: base_type.to_string(),
            field_name: field.name.clone(),
            related_type: field.related_type.clone(),
            inverse_field_name,
            inverse_kind,
            inverse_is_async: inverse.map(|f| f.is_async).unwrap_or(false),
            inverse_is_implicit: inverse_kind == EdgeKind::Implicit,
            inverse_is_polymorphic: inverse.map(|f| f.polymorphic).unwrap_or(false),
            is_async: field.is_async,
            is_collection: field.kind.is_collection(),
            is_polymorphic: field.polymorphic,
            is_implicit: false,
            is_paginated: field.paginated,
            reset_on_remote_update: field.reset_on_remote_update,
        }
    }

    fn implicit_for(declaring_type: &str, field: &RelationshipField) -> EdgeDefinition {
        EdgeDefinition {
            kind: EdgeKind::Implicit,
            base_type: field.related_type.clone(),
            field_name: implicit_key(declaring_type, &field.name),
            related_type: declaring_type.to_string(),
            inverse_field_name: field.name.clone(),
            inverse_kind: field.kind.into(),
            inverse_is_async: field.is_async,
            inverse_is_implicit: false,
            inverse_is_polymorphic: field.polymorphic,
            is_async: false,
            is_collection: true,
            is_polymorphic: false,
            is_implicit: true,
            is_paginated: false,
            reset_on_remote_update: None,
        }
    }
}

/// Memoizing `(type, field) -> EdgeDefinition` resolver plus the polymorphic family table.
#[derive(Debug)]
pub struct DefinitionResolver {
    schema: SchemaRegistry,
    cache: RwLock<HashMap<(String, String), Arc<EdgeDefinition>>>,
    families: RwLock<HashMap<String, HashSet<String>>>,
}

impl DefinitionResolver {
    pub fn new(schema: SchemaRegistry) -> Self {
        DefinitionResolver {
            schema,
            cache: RwLock::new(HashMap::new()),
            families: RwLock::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    fn cached(&self, type_name: &str, field: &str) -> Option<Arc<EdgeDefinition>> {
        self.cache
            .read()
            .get(&(type_name.to_string(), field.to_string()))
            .cloned()
    }

    /// Inserts unless present; returns whatever ends up cached.
    fn cache_insert(
        &self,
        type_name: &str,
        field: &str,
        definition: EdgeDefinition,
    ) -> Arc<EdgeDefinition> {
        self.cache
            .write()
            .entry((type_name.to_string(), field.to_string()))
            .or_insert_with(|| Arc::new(definition))
            .clone()
    }

    fn alias(&self, type_name: &str, field: &str, definition: Arc<EdgeDefinition>) {
        self.cache
            .write()
            .entry((type_name.to_string(), field.to_string()))
            .or_insert(definition);
    }

    /// Look up (and on first access, derive) the definition of `type_name.field`.
    ///
    /// Repeated calls return the same `Arc`.
    pub fn get_definition(
        &self,
        type_name: &str,
        field: &str,
    ) -> Result<Arc<EdgeDefinition>, GraphError> {
        self.lookup(type_name, field, &mut HashSet::new())
    }

    fn lookup(
        &self,
        type_name: &str,
        field: &str,
        visited: &mut HashSet<String>,
    ) -> Result<Arc<EdgeDefinition>, GraphError> {
        if let Some(definition) = self.cached(type_name, field) {
            return Ok(definition);
        }

        if !is_implicit_key(field) {
            if let Some(declared) = self.schema.field(type_name, field) {
                return self.resolve_declared(type_name, &declared);
            }
        }

        // Concrete members of a polymorphic family share the base type's definitions.
        visited.insert(type_name.to_string());
        for base in self.bases_of(type_name) {
            if visited.contains(&base) {
                continue;
            }
            if let Ok(definition) = self.lookup(&base, field, visited) {
                self.alias(type_name, field, definition.clone());
                return Ok(definition);
            }
        }

        Err(GraphError::UnknownRelationship {
            type_name: type_name.to_string(),
            field: field.to_string(),
        })
    }

    fn resolve_declared(
        &self,
        type_name: &str,
        declared: &RelationshipField,
    ) -> Result<Arc<EdgeDefinition>, GraphError> {
        let Some(inverse_name) = declared.inverse.clone() else {
            let implicit = EdgeDefinition::implicit_for(type_name, declared);
            let implicit_name = implicit.field_name.clone();
            self.cache_insert(&declared.related_type, &implicit_name, implicit);
            tracing::debug!(
                "[DefinitionResolver::resolve_declared] synthesized {} on {}",
                implicit_name,
                declared.related_type
            );
            let definition = EdgeDefinition::declared(
                type_name,
                declared,
                implicit_name,
                EdgeKind::Implicit,
                None,
            );
            return Ok(self.cache_insert(type_name, &declared.name, definition));
        };

        // The inverse side may already be resolved, e.g. through a concrete polymorphic member.
        if let Some(inverse) = self.cached(&declared.related_type, &inverse_name) {
            let inverse_field = self.schema.field(&declared.related_type, &inverse_name);
            let definition = EdgeDefinition::declared(
                type_name,
                declared,
                inverse_name,
                inverse.kind,
                inverse_field.as_ref(),
            );
            return Ok(self.cache_insert(type_name, &declared.name, definition));
        }

        let inverse_field = match self.schema.field(&declared.related_type, &inverse_name) {
            Some(field) => field,
            None => self
                .find_conforming_inverse(type_name, &declared.related_type, &inverse_name)
                .ok_or_else(|| GraphError::UnknownRelationship {
                    type_name: declared.related_type.clone(),
                    field: inverse_name.clone(),
                })?,
        };

        let definition = EdgeDefinition::declared(
            type_name,
            declared,
            inverse_name.clone(),
            inverse_field.kind.into(),
            Some(&inverse_field),
        );
        let inverse_definition = EdgeDefinition::declared(
            &declared.related_type,
            &inverse_field,
            declared.name.clone(),
            declared.kind.into(),
            Some(declared),
        );
        let definition = self.cache_insert(type_name, &declared.name, definition);
        self.cache_insert(&declared.related_type, &inverse_name, inverse_definition);
        Ok(definition)
    }

    /// For an abstract related type with no schema, borrow the inverse shape from a concrete type
    /// that declares `inverse_name` as standing in for `abstract_type`.
    fn find_conforming_inverse(
        &self,
        owner_type: &str,
        abstract_type: &str,
        inverse_name: &str,
    ) -> Option<RelationshipField> {
        let mut candidates = self.schema.list_schemas();
        candidates.sort();
        candidates.into_iter().find_map(|candidate| {
            self.schema
                .field(&candidate, inverse_name)
                .filter(|field| {
                    field.conforms_to.as_deref() == Some(abstract_type)
                        && field.related_type == owner_type
                })
        })
    }

    fn bases_of(&self, concrete: &str) -> Vec<String> {
        let mut bases = self
            .families
            .read()
            .iter()
            .filter(|(_, members)| members.contains(concrete))
            .map(|(base, _)| base.clone())
            .collect::<Vec<_>>();
        bases.sort();
        bases
    }

    /// Whether `ancestor` is reachable from `type_name` through registered bases.
    fn descends_from(&self, type_name: &str, ancestor: &str) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![type_name.to_string()];
        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for base in self.bases_of(&current) {
                if base == ancestor {
                    return true;
                }
                pending.push(base);
            }
        }
        false
    }

    /// Record that `concrete_type` satisfies `base_type`.
    ///
    /// Returns false if already known, or if `base_type` itself descends from `concrete_type`.
    pub fn register_polymorphic_type(&self, base_type: &str, concrete_type: &str) -> bool {
        if base_type == concrete_type {
            return false;
        }
        if self.descends_from(base_type, concrete_type) {
            tracing::warn!(
                "[DefinitionResolver::register_polymorphic_type] {} already satisfies {}, \
                 refusing cyclic family",
                base_type,
                concrete_type
            );
            return false;
        }
        let inserted = self
            .families
            .write()
            .entry(base_type.to_string())
            .or_default()
            .insert(concrete_type.to_string());
        if inserted {
            tracing::debug!(
                "[DefinitionResolver::register_polymorphic_type] {} satisfies {}",
                concrete_type,
                base_type
            );
        } else {
            tracing::info!(
                "[DefinitionResolver::register_polymorphic_type] {} already registered for {}",
                concrete_type,
                base_type
            );
        }
        inserted
    }

    pub fn is_registered(&self, base_type: &str, concrete_type: &str) -> bool {
        self.families
            .read()
            .get(base_type)
            .map(|members| members.contains(concrete_type))
            .unwrap_or(false)
    }

    /// Whether a value of `value_type` may be stored in an edge described by `definition`.
    ///
    /// A polymorphic relationship also accepts a type whose schema declares the inverse field as
    /// standing in for the related type; such a type is registered as a side effect.
    pub fn satisfies(&self, definition: &EdgeDefinition, value_type: &str) -> bool {
        if definition.related_type == value_type
            || self.is_registered(&definition.related_type, value_type)
        {
            return true;
        }
        if definition.is_polymorphic {
            let conforms = self
                .schema
                .field(value_type, &definition.inverse_field_name)
                .map(|field| {
                    field.conforms_to.as_deref() == Some(definition.related_type.as_str())
                })
                .unwrap_or(false);
            if conforms {
                self.register_polymorphic_type(&definition.related_type, value_type);
                return true;
            }
        }
        false
    }
}

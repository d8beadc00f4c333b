//! Resource identifiers.
//!
//! An [`Identifier`] is a cheap, shared handle for one resource. Its `lid` is assigned once and
//! never changes, while its public `id` may be filled in when a client-created resource is
//! persisted. Identifiers compare and hash by `lid` only, so two handles with the same `lid` are
//! the same resource regardless of what their `id` currently reads.
//!
//! The graph never constructs identifiers itself: it receives them from an
//! [`IdentifierRegistry`]. [`IdentifierCache`] is the in-memory registry used by callers that do
//! not bring their own.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize, Serializer};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};
use uuid::Uuid;

/// Prefix used for locally generated `lid` values.
pub const LID_PREFIX: &str = "@lid:";

#[derive(Debug)]
struct IdentifierInner {
    type_name: String,
    lid: String,
    id: RwLock<Option<String>>,
}

/// Stable handle for a resource: `{type, id, lid}`.
#[derive(Debug, Clone)]
pub struct Identifier(Arc<IdentifierInner>);

impl Identifier {
    /// Registries call this; application code should go through an [`IdentifierRegistry`].
    pub fn new(type_name: impl Into<String>, id: Option<String>, lid: impl Into<String>) -> Self {
        Identifier(Arc::new(IdentifierInner {
            type_name: type_name.into(),
            lid: lid.into(),
            id: RwLock::new(id),
        }))
    }

    pub fn type_name(&self) -> &str {
        &self.0.type_name
    }

    pub fn lid(&self) -> &str {
        &self.0.lid
    }

    pub fn id(&self) -> Option<String> {
        self.0.id.read().clone()
    }

    /// Sets the public id. Every clone of this handle observes the change.
    pub fn set_id(&self, id: Option<String>) {
        *self.0.id.write() = id;
    }

    pub fn pointer(&self) -> ResourcePointer {
        ResourcePointer {
            type_name: self.type_name().to_string(),
            id: self.id(),
            lid: Some(self.lid().to_string()),
        }
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.0.lid == other.0.lid
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.lid.hash(state);
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}:{} ({})", self.type_name(), id, self.lid()),
            None => write!(f, "{}:<new> ({})", self.type_name(), self.lid()),
        }
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.pointer().serialize(serializer)
    }
}

/// An unresolved reference to a resource, as found in a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourcePointer {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub lid: Option<String>,
}

impl ResourcePointer {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        ResourcePointer {
            type_name: type_name.into(),
            id: Some(id.into()),
            lid: None,
        }
    }
}

/// Resolves payload pointers into stable identifiers.
pub trait IdentifierRegistry {
    /// Must return the same handle for the same resource for the resource's whole lifetime.
    fn resolve_identifier(&self, pointer: &ResourcePointer) -> Identifier;
}

#[derive(Debug, Default)]
struct CacheMaps {
    by_lid: HashMap<String, Identifier>,
    by_id: HashMap<(String, String), Identifier>,
}

/// In-memory [`IdentifierRegistry`] keyed by `lid` and by `(type, id)`.
#[derive(Debug, Clone, Default)]
pub struct IdentifierCache(Arc<RwLock<CacheMaps>>);

impl IdentifierCache {
    pub fn new() -> Self {
        IdentifierCache::default()
    }

    pub fn generate_lid(type_name: &str) -> String {
        format!("{LID_PREFIX}{type_name}-{}", Uuid::new_v4())
    }

    /// Allocate an identifier for a client-created resource that has no id yet.
    pub fn create_identifier(&self, type_name: &str) -> Identifier {
        let identifier = Identifier::new(type_name, None, IdentifierCache::generate_lid(type_name));
        self.0
            .write()
            .by_lid
            .insert(identifier.lid().to_string(), identifier.clone());
        identifier
    }

    pub fn peek(&self, pointer: &ResourcePointer) -> Option<Identifier> {
        let maps = self.0.read();
        if let Some(found) = pointer.lid.as_ref().and_then(|lid| maps.by_lid.get(lid)) {
            return Some(found.clone());
        }
        pointer.id.as_ref().and_then(|id| {
            maps.by_id
                .get(&(pointer.type_name.clone(), id.clone()))
                .cloned()
        })
    }

    /// Assign a server id to `identifier`.
    ///
    /// When a different identifier already owns `(type, id)`, nothing is changed and that
    /// identifier is returned: the two handles describe one resource and the caller should merge
    /// `identifier` into the returned one.
    pub fn assign_id(&self, identifier: &Identifier, id: &str) -> Option<Identifier> {
        let key = (identifier.type_name().to_string(), id.to_string());
        let mut maps = self.0.write();
        if let Some(existing) = maps.by_id.get(&key) {
            if existing != identifier {
                tracing::debug!(
                    "[IdentifierCache::assign_id] {} collides with {}, merge required",
                    identifier,
                    existing
                );
                return Some(existing.clone());
            }
            return None;
        }
        if let Some(previous) = identifier.id() {
            maps.by_id
                .remove(&(identifier.type_name().to_string(), previous));
        }
        identifier.set_id(Some(id.to_string()));
        maps.by_id.insert(key, identifier.clone());
        maps.by_lid
            .insert(identifier.lid().to_string(), identifier.clone());
        None
    }

    /// Drop every mapping for `identifier`.
    pub fn forget(&self, identifier: &Identifier) {
        let mut maps = self.0.write();
        maps.by_lid.remove(identifier.lid());
        if let Some(id) = identifier.id() {
            let key = (identifier.type_name().to_string(), id);
            if maps.by_id.get(&key) == Some(identifier) {
                maps.by_id.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.read().by_lid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentifierRegistry for IdentifierCache {
    fn resolve_identifier(&self, pointer: &ResourcePointer) -> Identifier {
        if let Some(found) = self.peek(pointer) {
            return found;
        }
        let lid = pointer
            .lid
            .clone()
            .unwrap_or_else(|| IdentifierCache::generate_lid(&pointer.type_name));
        let identifier = Identifier::new(pointer.type_name.clone(), pointer.id.clone(), lid);
        let mut maps = self.0.write();
        maps.by_lid
            .insert(identifier.lid().to_string(), identifier.clone());
        if let Some(id) = &pointer.id {
            maps.by_id
                .insert((pointer.type_name.clone(), id.clone()), identifier.clone());
        }
        identifier
    }
}

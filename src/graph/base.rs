//! Graph: owner of every relationship edge.
//!
//! Edges live in an arena keyed by `(lid, field)`; inverse traversal is a lookup, never a
//! pointer. All mutation enters through [`Graph::update`] (or the lifecycle methods below), which
//! validate first, route to a handler in [`super::handlers`], and for a top-level call run the
//! local resync pass and deliver notifications before returning.

use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use super::{
    definition::{is_implicit_key, DefinitionResolver, EdgeDefinition, EdgeKind},
    edge::{Edge, EdgeFlag, Layer},
    handlers,
    operations::{Operation, RelationshipData, RelationshipValue},
    sync::KeyQueue,
};
use crate::{
    config::GraphConfig, error::GraphError, event::GraphStore, identifier::Identifier,
    schema::SchemaRegistry,
};

/// `(lid, field key)`
pub(crate) type EdgeKey = (String, String);

pub(crate) fn edge_key(identifier: &Identifier, field: &str) -> EdgeKey {
    (identifier.lid().to_string(), field.to_string())
}

/// How an edge's local layer differs from its remote layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EdgeChange {
    Resource {
        remote: Option<Identifier>,
        local: Option<Identifier>,
    },
    Collection {
        additions: Vec<Identifier>,
        removals: Vec<Identifier>,
        /// Same members, different order.
        reordered: bool,
    },
}

pub struct Graph {
    pub(crate) resolver: DefinitionResolver,
    pub(crate) store: Arc<dyn GraphStore>,
    pub(crate) config: GraphConfig,
    pub(crate) edges: HashMap<String, HashMap<String, Edge>>,
    pub(crate) batch_depth: usize,
    /// Edges whose remote layer changed in the open batch.
    pub(crate) transaction: KeyQueue,
    pub(crate) sync_queue: KeyQueue,
    pub(crate) notifications: KeyQueue,
    pub(crate) silenced: bool,
}

impl Graph {
    pub fn new(schema: SchemaRegistry, store: Arc<dyn GraphStore>) -> Graph {
        Graph::with_config(schema, store, GraphConfig::default())
    }

    pub fn with_config(
        schema: SchemaRegistry,
        store: Arc<dyn GraphStore>,
        config: GraphConfig,
    ) -> Graph {
        Graph {
            resolver: DefinitionResolver::new(schema),
            store,
            config,
            edges: HashMap::new(),
            batch_depth: 0,
            transaction: KeyQueue::default(),
            sync_queue: KeyQueue::default(),
            notifications: KeyQueue::default(),
            silenced: false,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaRegistry {
        self.resolver.schema()
    }

    pub fn get_definition(
        &self,
        identifier: &Identifier,
        field: &str,
    ) -> Result<Arc<EdgeDefinition>, GraphError> {
        self.resolver.get_definition(identifier.type_name(), field)
    }

    /// The edge for `identifier.field`, created empty on first access.
    pub fn get(&mut self, identifier: &Identifier, field: &str) -> Result<&Edge, GraphError> {
        if is_implicit_key(field) {
            return Err(GraphError::UnknownRelationship {
                type_name: identifier.type_name().to_string(),
                field: field.to_string(),
            });
        }
        let definition = self.get_definition(identifier, field)?;
        Ok(self.edge_entry(identifier, &definition))
    }

    /// The edge for `identifier.field` if it was ever accessed.
    pub fn peek(&self, identifier: &Identifier, field: &str) -> Option<&Edge> {
        self.edges
            .get(identifier.lid())
            .and_then(|fields| fields.get(field))
    }

    /// Whether any edge is stored for `identifier`.
    pub fn has(&self, identifier: &Identifier) -> bool {
        self.edges
            .get(identifier.lid())
            .map(|fields| !fields.is_empty())
            .unwrap_or(false)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashMap::len).sum()
    }

    pub fn register_polymorphic_type(&self, base_type: &str, concrete_type: &str) -> bool {
        self.resolver
            .register_polymorphic_type(base_type, concrete_type)
    }

    /// Apply one operation to the remote (`is_remote`) or local layer.
    ///
    /// Outside a remote batch the call is its own batch: local state is resynced and pending
    /// notifications are delivered before it returns.
    pub fn update(&mut self, operation: Operation, is_remote: bool) -> Result<(), GraphError> {
        tracing::debug!("[Graph::update] {} (remote={})", operation, is_remote);
        let label = operation.to_string();
        let result = self.within_batch(|graph| handlers::apply(graph, operation, is_remote));
        if let Err(error) = &result {
            tracing::error!("[Graph::update] {} rejected: {}", label, error);
        }
        result
    }

    /// Drop `identifier` from the graph. Edges that referenced it are flagged
    /// `HasDematerializedInverse`.
    pub fn unload(&mut self, identifier: &Identifier) {
        let silence = self.config.silence_unload_notifications;
        self.within_batch(|graph| {
            let was_silenced = std::mem::replace(&mut graph.silenced, silence);
            handlers::remove_identifier(graph, identifier, true);
            graph.silenced = was_silenced;
        });
    }

    /// Whether the store may release `identifier` without losing relationship state the server
    /// would not send again.
    pub fn is_releasable(&self, identifier: &Identifier) -> bool {
        if self.is_new(identifier) {
            return true;
        }
        !self
            .edges
            .get(identifier.lid())
            .map(|fields| fields.values().any(|edge| edge.definition().inverse_is_async))
            .unwrap_or(false)
    }

    /// Per field, how local state differs from remote state.
    pub fn changed(&self, identifier: &Identifier) -> BTreeMap<String, EdgeChange> {
        let mut changes = BTreeMap::new();
        let Some(fields) = self.edges.get(identifier.lid()) else {
            return changes;
        };
        for (field, edge) in fields.iter() {
            match edge {
                Edge::Resource(edge) if edge.local != edge.remote => {
                    changes.insert(
                        field.clone(),
                        EdgeChange::Resource {
                            remote: edge.remote.clone(),
                            local: edge.local.clone(),
                        },
                    );
                }
                Edge::Collection(edge) if edge.local != edge.remote => {
                    let additions = edge
                        .local
                        .iter()
                        .filter(|member| !edge.remote.contains(member))
                        .cloned()
                        .collect::<Vec<_>>();
                    let removals = edge
                        .remote
                        .iter()
                        .filter(|member| !edge.local.contains(member))
                        .cloned()
                        .collect::<Vec<_>>();
                    let reordered = edge.local.same_members(&edge.remote);
                    changes.insert(
                        field.clone(),
                        EdgeChange::Collection {
                            additions,
                            removals,
                            reordered,
                        },
                    );
                }
                _ => {}
            }
        }
        changes
    }

    /// Reset the local layer of every edge of `identifier` to its remote layer. Returns the
    /// fields that changed.
    pub fn rollback(&mut self, identifier: &Identifier) -> Vec<String> {
        self.within_batch(|graph| {
            let definitions = graph
                .edges
                .get(identifier.lid())
                .map(|fields| {
                    fields
                        .values()
                        .filter(|edge| edge.kind() != EdgeKind::Implicit && edge.is_changed())
                        .map(|edge| edge.definition().clone())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let mut rolled_back = Vec::new();
            for definition in definitions {
                let field = definition.field_name.clone();
                let target = match graph.peek(identifier, &field) {
                    Some(Edge::Resource(edge)) => RelationshipValue::One(edge.remote.clone()),
                    Some(Edge::Collection(edge)) => {
                        RelationshipValue::Many(edge.remote.as_slice().to_vec())
                    }
                    _ => continue,
                };
                match target {
                    RelationshipValue::One(remote) => {
                        handlers::set_value(graph, identifier, &definition, remote, Layer::Local);
                    }
                    RelationshipValue::Many(remote) => {
                        handlers::replace_members(
                            graph,
                            identifier,
                            &definition,
                            remote,
                            Layer::Local,
                        );
                        if let Some(Edge::Collection(edge)) = graph.edge_mut(identifier, &field) {
                            edge.normalize_intent();
                        }
                    }
                }
                rolled_back.push(field);
            }
            rolled_back.sort();
            tracing::debug!("[Graph::rollback] {} reset {:?}", identifier, rolled_back);
            rolled_back
        })
    }

    /// Local-layer view of `identifier.field` in payload form. `data` is present once data was
    /// received or set locally.
    pub fn get_data(
        &self,
        identifier: &Identifier,
        field: &str,
    ) -> Result<RelationshipData, GraphError> {
        if is_implicit_key(field) {
            return Err(GraphError::UnknownRelationship {
                type_name: identifier.type_name().to_string(),
                field: field.to_string(),
            });
        }
        self.get_definition(identifier, field)?;
        let Some(edge) = self.peek(identifier, field) else {
            return Ok(RelationshipData::default());
        };
        let data = match edge {
            Edge::Resource(edge) if edge.state.has_received_data() || edge.local.is_some() => {
                Some(RelationshipValue::One(edge.local.clone()))
            }
            Edge::Collection(edge) if edge.state.has_received_data() || !edge.local.is_empty() => {
                Some(RelationshipValue::Many(edge.local.as_slice().to_vec()))
            }
            _ => None,
        };
        Ok(RelationshipData {
            data,
            links: edge.links().cloned(),
            meta: edge.meta().cloned(),
        })
    }

    pub fn mark_load_failed(&mut self, identifier: &Identifier, field: &str) -> Result<(), GraphError> {
        let definition = handlers::public_definition(self, identifier, field)?;
        self.within_batch(|graph| {
            graph
                .edge_entry(identifier, &definition)
                .state_mut()
                .set(EdgeFlag::HasFailedLoadAttempt, true);
            graph.notify(identifier, field);
        });
        Ok(())
    }

    /// Check inverse symmetry on both layers and collection coherence across the whole graph.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (lid, fields) in self.edges.iter() {
            for (field, edge) in fields.iter() {
                let owner = edge.identifier();
                if owner.lid() != lid || &edge.definition().field_name != field {
                    errors.push(format!("edge stored under ({lid}, {field}) belongs to {owner}"));
                }
                if let Edge::Collection(collection) = edge {
                    for layer in Layer::both() {
                        if !collection.members(layer).is_coherent() {
                            errors.push(format!(
                                "{owner}.{field} {layer:?} membership and order disagree"
                            ));
                        }
                    }
                }
                let inverse_field = &edge.definition().inverse_field_name;
                for layer in Layer::both() {
                    for member in edge.members(layer) {
                        let points_back = self
                            .peek(&member, inverse_field)
                            .map(|inverse| inverse.contains(layer, owner))
                            .unwrap_or(false);
                        if !points_back {
                            errors.push(format!(
                                "{owner}.{field} holds {member} on {layer:?} but {member}.{inverse_field} does not hold {owner}"
                            ));
                        }
                    }
                }
            }
        }
        errors.sort();
        errors
    }

    /// Deliver queued change notifications, once per dirty edge.
    pub fn flush_notifications(&mut self) {
        let pending = self.notifications.drain();
        if pending.is_empty() {
            return;
        }
        tracing::debug!("[Graph::flush_notifications] {} edges", pending.len());
        for (lid, field) in pending {
            let Some(edge) = self
                .edges
                .get_mut(&lid)
                .and_then(|fields| fields.get_mut(&field))
            else {
                continue;
            };
            edge.state_mut().set(EdgeFlag::IsDirty, false);
            self.store.notify_change(edge.identifier(), &field);
        }
    }

    pub(crate) fn within_batch<R, F: FnOnce(&mut Graph) -> R>(&mut self, f: F) -> R {
        self.batch_depth += 1;
        let result = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.finish_batch();
        }
        result
    }

    pub(crate) fn edge_entry(
        &mut self,
        identifier: &Identifier,
        definition: &Arc<EdgeDefinition>,
    ) -> &mut Edge {
        self.edges
            .entry(identifier.lid().to_string())
            .or_default()
            .entry(definition.field_name.clone())
            .or_insert_with(|| Edge::new(identifier.clone(), definition.clone()))
    }

    pub(crate) fn edge_mut(&mut self, identifier: &Identifier, field: &str) -> Option<&mut Edge> {
        self.edges
            .get_mut(identifier.lid())
            .and_then(|fields| fields.get_mut(field))
    }

    /// The definition of the edge on `value` that mirrors `definition`.
    pub(crate) fn inverse_definition(
        &self,
        definition: &EdgeDefinition,
        value: &Identifier,
    ) -> Option<Arc<EdgeDefinition>> {
        match self
            .resolver
            .get_definition(value.type_name(), &definition.inverse_field_name)
        {
            Ok(inverse) => Some(inverse),
            Err(error) => {
                tracing::error!(
                    "[Graph::inverse_definition] no inverse for {}.{} on {}: {}",
                    definition.base_type,
                    definition.field_name,
                    value,
                    error
                );
                None
            }
        }
    }

    /// Record that one layer of an edge changed.
    pub(crate) fn touch(&mut self, identifier: &Identifier, field: &str, layer: Layer) {
        if layer == Layer::Remote {
            let key = edge_key(identifier, field);
            let is_implicit = self
                .edge_mut(identifier, field)
                .map(|edge| {
                    let is_empty = edge.layer_is_empty(Layer::Remote);
                    edge.state_mut().set(EdgeFlag::IsEmpty, is_empty);
                    edge.kind() == EdgeKind::Implicit
                })
                .unwrap_or(false);
            self.add_to_transaction(key.clone());
            if !is_implicit {
                self.schedule_local_sync(key);
            }
        }
        self.notify(identifier, field);
    }

    pub(crate) fn add_to_transaction(&mut self, key: EdgeKey) {
        self.transaction.push(key);
    }

    pub(crate) fn schedule_local_sync(&mut self, key: EdgeKey) {
        self.sync_queue.push(key);
    }

    /// Queue one notification for the edge unless one is already pending.
    pub(crate) fn notify(&mut self, identifier: &Identifier, field: &str) {
        if self.silenced {
            return;
        }
        let Some(edge) = self.edge_mut(identifier, field) else {
            return;
        };
        if edge.kind() == EdgeKind::Implicit || edge.state().is_dirty() {
            return;
        }
        edge.state_mut().set(EdgeFlag::IsDirty, true);
        self.notifications.push(edge_key(identifier, field));
    }

    pub(crate) fn is_new(&self, identifier: &Identifier) -> bool {
        self.store.is_new(identifier)
    }

    pub(crate) fn resets_on_remote_update(&self, definition: &EdgeDefinition) -> bool {
        definition
            .reset_on_remote_update
            .unwrap_or(self.config.reset_local_on_remote_update)
    }

    /// Point queued work for `from` at `to`.
    pub(crate) fn rewrite_pending(&mut self, from: &Identifier, to: &Identifier) {
        for queue in [
            &mut self.transaction,
            &mut self.sync_queue,
            &mut self.notifications,
        ] {
            queue.rewrite_lid(from.lid(), to.lid());
        }
    }

    /// Drop queued work for an identifier whose edges are gone.
    pub(crate) fn forget_pending(&mut self, identifier: &Identifier) {
        for queue in [
            &mut self.transaction,
            &mut self.sync_queue,
            &mut self.notifications,
        ] {
            queue.retain(|(lid, _)| lid != identifier.lid());
        }
    }

    /// All identifiers that own at least one edge.
    pub fn identifiers(&self) -> HashSet<Identifier> {
        self.edges
            .values()
            .filter_map(|fields| fields.values().next())
            .map(|edge| edge.identifier().clone())
            .collect()
    }
}

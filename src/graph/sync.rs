//! Remote batches and the local resync pass.
//!
//! Remote operations only write the remote layer. Every edge they touch is queued, and when the
//! outermost batch closes each queued edge has its local layer rebuilt from the remote layer in
//! the order the edges were first touched. Zero or more [`RemoteBatch`] guards may be nested;
//! only the outermost close does the work.

use std::{
    collections::HashSet,
    ops::{Deref, DerefMut},
};

use super::{
    base::{EdgeKey, Graph},
    definition::EdgeDefinition,
    edge::{Edge, Layer},
    handlers::{self, attach, detach},
};
use crate::{error::GraphError, identifier::Identifier};

/// Insertion-ordered set of edge keys.
#[derive(Debug, Default, Clone)]
pub(crate) struct KeyQueue {
    order: Vec<EdgeKey>,
    seen: HashSet<EdgeKey>,
}

impl KeyQueue {
    pub(crate) fn push(&mut self, key: EdgeKey) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push(key);
        true
    }

    pub(crate) fn drain(&mut self) -> Vec<EdgeKey> {
        self.seen.clear();
        std::mem::take(&mut self.order)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn retain<F: FnMut(&EdgeKey) -> bool>(&mut self, mut keep: F) {
        self.order.retain(|key| keep(key));
        self.seen = self.order.iter().cloned().collect();
    }

    /// Re-key entries of `from` to `to`, keeping the first position of any collision.
    pub(crate) fn rewrite_lid(&mut self, from: &str, to: &str) {
        let order = std::mem::take(&mut self.order);
        self.seen.clear();
        for (lid, field) in order {
            if lid == from {
                self.push((to.to_string(), field));
            } else {
                self.push((lid, field));
            }
        }
    }
}

/// Scope guard for a sequence of remote operations.
///
/// Dropping the guard (or calling [`RemoteBatch::close`]) ends the batch. The graph is reachable
/// through the guard for the batch's duration.
pub struct RemoteBatch<'g> {
    graph: &'g mut Graph,
    closed: bool,
}

impl RemoteBatch<'_> {
    /// End the batch now, reporting a close without a matching open.
    pub fn close(mut self) -> Result<(), GraphError> {
        self.closed = true;
        self.graph.end_remote_batch()
    }
}

impl Deref for RemoteBatch<'_> {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        self.graph
    }
}

impl DerefMut for RemoteBatch<'_> {
    fn deref_mut(&mut self) -> &mut Graph {
        self.graph
    }
}

impl Drop for RemoteBatch<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(error) = self.graph.end_remote_batch() {
            tracing::error!("[RemoteBatch::drop] {}", error);
        }
    }
}

impl Graph {
    /// Open a remote batch. Local resync and notifications are deferred until the outermost
    /// batch closes.
    pub fn begin_remote_batch(&mut self) -> RemoteBatch<'_> {
        self.batch_depth += 1;
        tracing::debug!("[Graph::begin_remote_batch] depth {}", self.batch_depth);
        RemoteBatch {
            graph: self,
            closed: false,
        }
    }

    pub fn is_in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    /// Number of edges with a remote change in the open batch.
    pub fn transaction_len(&self) -> usize {
        self.transaction.len()
    }

    fn end_remote_batch(&mut self) -> Result<(), GraphError> {
        if self.batch_depth == 0 {
            return Err(GraphError::BatchState(
                "batch closed without being opened".to_string(),
            ));
        }
        self.batch_depth -= 1;
        tracing::debug!("[Graph::end_remote_batch] depth {}", self.batch_depth);
        if self.batch_depth == 0 {
            self.finish_batch();
        }
        Ok(())
    }

    pub(crate) fn finish_batch(&mut self) {
        let touched = self.transaction.drain();
        if !touched.is_empty() {
            tracing::debug!(
                "[Graph::finish_batch] {} edges changed remotely",
                touched.len()
            );
        }
        self.sync_local();

        if self.config.verify_invariants {
            let errors = self.check_invariants();
            if !errors.is_empty() {
                tracing::error!(
                    "[Graph::finish_batch] graph invariants violated:\n- {}",
                    errors.join("\n- ")
                );
            }
            debug_assert!(errors.is_empty(), "graph invariants violated: {errors:?}");
        }
        self.flush_notifications();
    }

    /// Merge remote changes into the local layer of every queued edge, keeping local intent.
    fn sync_local(&mut self) {
        let queued = self.sync_queue.drain();
        if queued.is_empty() {
            return;
        }
        tracing::debug!("[Graph::sync_local] resyncing {} edges", queued.len());
        for (lid, field) in queued {
            let Some(edge) = self.edges.get(&lid).and_then(|fields| fields.get(&field)) else {
                continue;
            };
            let identifier = edge.identifier().clone();
            let definition = edge.definition().clone();
            match edge {
                Edge::Resource(edge) => {
                    if edge.local == edge.remote {
                        continue;
                    }
                    let keeps_local = edge
                        .local
                        .as_ref()
                        .map(|value| self.keeps_local_value(&definition, value))
                        .unwrap_or(false)
                        || edge
                            .remote
                            .as_ref()
                            .map(|value| self.inverse_holds_override(&definition, value, &identifier))
                            .unwrap_or(false);
                    if keeps_local {
                        tracing::debug!(
                            "[Graph::sync_local] {}.{} keeps its local value",
                            identifier,
                            field
                        );
                        continue;
                    }
                    let remote = edge.remote.clone();
                    handlers::set_value(self, &identifier, &definition, remote, Layer::Local);
                }
                Edge::Collection(_) => {
                    let store = self.store.clone();
                    let Some(Edge::Collection(edge)) = self.edge_mut(&identifier, &field) else {
                        continue;
                    };
                    let before = edge.local.clone();
                    let (left, joined) = edge.rebuild_local(|member| store.is_new(member));
                    for member in left.iter() {
                        if let Some(inverse) = self.inverse_definition(&definition, member) {
                            detach(self, member, &inverse, &identifier, Layer::Local);
                        }
                    }
                    let mut overridden = Vec::new();
                    for member in joined {
                        if self.inverse_holds_override(&definition, &member, &identifier) {
                            overridden.push(member);
                        } else if let Some(inverse) = self.inverse_definition(&definition, &member)
                        {
                            attach(self, &member, &inverse, &identifier, Layer::Local, None);
                        }
                    }
                    let Some(Edge::Collection(edge)) = self.edge_mut(&identifier, &field) else {
                        continue;
                    };
                    for member in overridden.iter() {
                        edge.remove(Layer::Local, member);
                    }
                    if edge.local != before {
                        self.notify(&identifier, &field);
                    }
                }
                Edge::Implicit(_) => {}
            }
        }
    }

    /// A local resource value that survives remote updates: an unsaved record, or any value on a
    /// field that opts out of resets.
    fn keeps_local_value(&self, definition: &EdgeDefinition, value: &Identifier) -> bool {
        self.is_new(value) || !self.resets_on_remote_update(definition)
    }

    /// Whether `member`'s side of the relationship is a resource edge whose surviving local value
    /// is something other than `owner`.
    fn inverse_holds_override(
        &self,
        definition: &EdgeDefinition,
        member: &Identifier,
        owner: &Identifier,
    ) -> bool {
        match self.peek(member, &definition.inverse_field_name) {
            Some(Edge::Resource(inverse)) => match inverse.local.as_ref() {
                Some(value) if value != owner => self.keeps_local_value(&inverse.definition, value),
                _ => false,
            },
            _ => false,
        }
    }
}

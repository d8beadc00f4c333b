use std::sync::Arc;

use super::detach;
use crate::{
    graph::{
        base::Graph,
        definition::EdgeDefinition,
        edge::{CollectionEdge, Edge, EdgeFlag, ImplicitEdge, Layer, ResourceEdge},
    },
    identifier::Identifier,
};

/// Move every edge of `from` onto `to` and rewrite every reference to `from` in place.
pub(crate) fn merge_identifiers(graph: &mut Graph, from: &Identifier, to: &Identifier) {
    if from == to {
        return;
    }
    tracing::debug!("[merge_identifiers] {} -> {}", from, to);

    let mut moved = graph.edges.remove(from.lid()).unwrap_or_default();
    for edge in moved.values_mut() {
        edge.rewrite(from, to);
        edge.rebind(to);
    }

    // Every member of a moved edge points back at `from` through its inverse.
    for edge in moved.values() {
        let inverse_field = &edge.definition().inverse_field_name;
        for member in edge.referenced() {
            if let Some(inverse) = graph.edge_mut(&member, inverse_field) {
                if inverse.rewrite(from, to) {
                    graph.notify(&member, inverse_field);
                }
            }
        }
    }

    let mut orphaned = Vec::new();
    let mut installed = Vec::new();
    {
        let target = graph.edges.entry(to.lid().to_string()).or_default();
        for (field, edge) in moved {
            let merged = match target.remove(&field) {
                None => edge,
                Some(existing) => merge_edges(existing, edge, &mut orphaned),
            };
            target.insert(field.clone(), merged);
            installed.push(field);
        }
    }

    // A resource edge that kept its own value no longer owns the moved one.
    for (definition, value, layer) in orphaned {
        if let Some(inverse) = graph.inverse_definition(&definition, &value) {
            detach(graph, &value, &inverse, to, layer);
        }
    }

    graph.rewrite_pending(from, to);
    for field in installed {
        graph.notify(to, &field);
    }
    graph.store.notify_merged(from, to);
}

type Orphan = (Arc<EdgeDefinition>, Identifier, Layer);

/// Union `moved` into `existing`, which keeps its own members first.
fn merge_edges(existing: Edge, moved: Edge, orphaned: &mut Vec<Orphan>) -> Edge {
    match (existing, moved) {
        (Edge::Resource(existing), Edge::Resource(moved)) => {
            Edge::Resource(merge_resource(existing, moved, orphaned))
        }
        (Edge::Collection(existing), Edge::Collection(moved)) => {
            Edge::Collection(merge_collection(existing, moved))
        }
        (Edge::Implicit(existing), Edge::Implicit(moved)) => {
            Edge::Implicit(merge_implicit(existing, moved))
        }
        (existing, moved) => {
            tracing::warn!(
                "[merge_identifiers] {} has a {} edge for {} but the merged edge is {}, keeping the target's",
                existing.identifier(),
                existing.kind(),
                existing.definition().field_name,
                moved.kind()
            );
            existing
        }
    }
}

fn merge_resource(
    mut existing: ResourceEdge,
    moved: ResourceEdge,
    orphaned: &mut Vec<Orphan>,
) -> ResourceEdge {
    for layer in Layer::both() {
        match (existing.value(layer).cloned(), moved.value(layer).cloned()) {
            (None, Some(value)) => {
                existing.set(layer, Some(value));
            }
            (Some(kept), Some(value)) if kept != value => {
                orphaned.push((existing.definition.clone(), value, layer));
            }
            _ => {}
        }
    }
    if existing.meta.is_none() {
        existing.meta = moved.meta;
    }
    if existing.links.is_none() {
        existing.links = moved.links;
    }
    existing.state.0 |= moved.state.0 - EdgeFlag::IsDirty;
    existing
}

fn merge_collection(mut existing: CollectionEdge, moved: CollectionEdge) -> CollectionEdge {
    for member in moved.remote.iter() {
        existing.remote.push(member.clone());
    }
    for member in moved.local.iter() {
        existing.local.push(member.clone());
    }
    existing.normalize_intent();
    if existing.meta.is_none() {
        existing.meta = moved.meta;
    }
    if existing.links.is_none() {
        existing.links = moved.links;
    }
    existing.state.0 |= moved.state.0 - EdgeFlag::IsDirty;
    existing
}

fn merge_implicit(mut existing: ImplicitEdge, moved: ImplicitEdge) -> ImplicitEdge {
    existing.local.extend(moved.local);
    existing.remote.extend(moved.remote);
    existing
}

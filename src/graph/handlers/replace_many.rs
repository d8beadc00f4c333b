use std::{collections::HashSet, sync::Arc};

use super::{add_member, check_values, mark_received, remove_member, subject_definition};
use crate::{
    error::GraphError,
    graph::{
        base::Graph,
        definition::{EdgeDefinition, EdgeKind},
        edge::{Edge, Layer},
    },
    identifier::Identifier,
};

pub(crate) fn replace_related_records(
    graph: &mut Graph,
    record: &Identifier,
    field: &str,
    value: Vec<Identifier>,
    layer: Layer,
) -> Result<(), GraphError> {
    let definition = subject_definition(graph, record, field, EdgeKind::Collection)?;
    check_values(graph, record, &definition, &value)?;
    let value = dedupe(record, field, value);
    graph.edge_entry(record, &definition);

    replace_members(graph, record, &definition, value, layer);
    if layer == Layer::Remote {
        mark_received(graph, record, field);
    }
    Ok(())
}

/// Keep the first occurrence of each identifier.
fn dedupe(record: &Identifier, field: &str, value: Vec<Identifier>) -> Vec<Identifier> {
    let received = value.len();
    let mut seen = HashSet::with_capacity(received);
    let unique = value
        .into_iter()
        .filter(|member| seen.insert(member.clone()))
        .collect::<Vec<_>>();
    if unique.len() != received {
        tracing::warn!(
            "[replace_related_records] {}.{} received {} duplicate identifiers, keeping first occurrences",
            record,
            field,
            received - unique.len()
        );
    }
    unique
}

/// Make one layer of a collection edge exactly `value` (unique, in order), updating the inverse
/// of every member that leaves or joins. A pure reorder still counts as a change.
pub(crate) fn replace_members(
    graph: &mut Graph,
    record: &Identifier,
    definition: &Arc<EdgeDefinition>,
    value: Vec<Identifier>,
    layer: Layer,
) -> bool {
    let current = match graph.edge_mut(record, &definition.field_name) {
        Some(Edge::Collection(edge)) => edge.members(layer).as_slice().to_vec(),
        _ => Vec::new(),
    };
    if current == value {
        return false;
    }

    {
        let next = value.iter().collect::<HashSet<_>>();
        let previous = current.iter().collect::<HashSet<_>>();
        for member in current.iter().filter(|member| !next.contains(member)) {
            remove_member(graph, record, definition, member, layer);
        }
        for member in value.iter().filter(|member| !previous.contains(member)) {
            add_member(graph, record, definition, member, layer, None);
        }
    }

    if let Some(Edge::Collection(edge)) = graph.edge_mut(record, &definition.field_name) {
        edge.set_order(layer, value);
    }
    graph.touch(record, &definition.field_name, layer);
    true
}

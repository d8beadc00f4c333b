use std::sync::Arc;

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

pub(crate) fn replace_related_record(
    graph: &mut Graph,
    record: &Identifier,
    field: &str,
    value: Option<Identifier>,
    layer: Layer,
) -> Result<(), GraphError> {
    let definition = subject_definition(graph, record, field, EdgeKind::Resource)?;
    check_values(graph, record, &definition, value.as_ref())?;
    graph.edge_entry(record, &definition);

    if !set_value(graph, record, &definition, value, layer) {
        tracing::debug!(
            "[replace_related_record] {}.{} unchanged on {:?}",
            record,
            field,
            layer
        );
    }
    if layer == Layer::Remote {
        mark_received(graph, record, field);
    }
    Ok(())
}

/// Swap the value of a resource edge on one layer, unlinking the old value's inverse and linking
/// the new one's. Returns false when the value was already in place.
pub(crate) fn set_value(
    graph: &mut Graph,
    record: &Identifier,
    definition: &Arc<EdgeDefinition>,
    value: Option<Identifier>,
    layer: Layer,
) -> bool {
    let current = match graph.edge_mut(record, &definition.field_name) {
        Some(Edge::Resource(edge)) => edge.value(layer).cloned(),
        _ => None,
    };
    if current == value {
        return false;
    }
    if let Some(previous) = current {
        remove_member(graph, record, definition, &previous, layer);
    }
    if let Some(next) = value {
        add_member(graph, record, definition, &next, layer, None);
    }
    true
}

//! Operation handlers.
//!
//! Each public operation is validated in full before the first edge is touched, so an `Err`
//! always leaves the graph as it was. The helpers in this module are the only code that pairs a
//! mutation with its inverse: [`attach`] and [`detach`] change one side, [`add_member`] and
//! [`remove_member`] change both.

mod add;
mod delete;
mod merge;
mod remove;
mod replace_many;
mod replace_one;
mod sort;
mod update_from_payload;

use std::sync::Arc;

pub(crate) use delete::remove_identifier;
pub(crate) use replace_many::replace_members;
pub(crate) use replace_one::set_value;

use super::{
    base::Graph,
    definition::{is_implicit_key, EdgeDefinition, EdgeKind},
    edge::{EdgeFlag, InsertOutcome, Layer},
    operations::Operation,
};
use crate::{error::GraphError, identifier::Identifier};

pub(crate) fn apply(
    graph: &mut Graph,
    operation: Operation,
    is_remote: bool,
) -> Result<(), GraphError> {
    let layer = if is_remote {
        Layer::Remote
    } else {
        Layer::Local
    };
    match operation {
        Operation::AddToRelatedRecords {
            record,
            field,
            value,
            index,
        } => add::add_to_related_records(graph, &record, &field, value, index, layer),
        Operation::RemoveFromRelatedRecords {
            record,
            field,
            value,
        } => remove::remove_from_related_records(graph, &record, &field, value, layer),
        Operation::ReplaceRelatedRecord {
            record,
            field,
            value,
        } => replace_one::replace_related_record(graph, &record, &field, value, layer),
        Operation::ReplaceRelatedRecords {
            record,
            field,
            value,
        } => replace_many::replace_related_records(graph, &record, &field, value, layer),
        Operation::SortRelatedRecords {
            record,
            field,
            value,
        } => sort::sort_related_records(graph, &record, &field, value),
        Operation::UpdateRelationship {
            record,
            field,
            payload,
        } => update_from_payload::update_relationship(graph, &record, &field, payload),
        Operation::MergeIdentifiers { record, value } => {
            merge::merge_identifiers(graph, &record, &value);
            Ok(())
        }
        Operation::DeleteRecord { record } => {
            remove_identifier(graph, &record, false);
            Ok(())
        }
    }
}

/// Resolve the subject edge of a public operation and check its cardinality.
pub(crate) fn subject_definition(
    graph: &Graph,
    record: &Identifier,
    field: &str,
    expected: EdgeKind,
) -> Result<Arc<EdgeDefinition>, GraphError> {
    let definition = public_definition(graph, record, field)?;
    if definition.kind != expected {
        return Err(GraphError::Cardinality {
            type_name: record.type_name().to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
            found: definition.kind.to_string(),
        });
    }
    Ok(definition)
}

/// Resolve a definition for a caller-supplied field, refusing implicit keys.
pub(crate) fn public_definition(
    graph: &Graph,
    record: &Identifier,
    field: &str,
) -> Result<Arc<EdgeDefinition>, GraphError> {
    if is_implicit_key(field) {
        return Err(GraphError::ImplicitMutation {
            type_name: record.type_name().to_string(),
            field: field.to_string(),
        });
    }
    graph.get_definition(record, field)
}

/// Every value must satisfy the relationship's type and have a resolvable inverse.
pub(crate) fn check_values<'a, I>(
    graph: &Graph,
    record: &Identifier,
    definition: &EdgeDefinition,
    values: I,
) -> Result<(), GraphError>
where
    I: IntoIterator<Item = &'a Identifier>,
{
    for value in values {
        if !graph.resolver.satisfies(definition, value.type_name()) {
            return Err(GraphError::PolymorphicMismatch {
                type_name: record.type_name().to_string(),
                field: definition.field_name.clone(),
                expected: definition.related_type.clone(),
                found: value.type_name().to_string(),
            });
        }
        graph
            .resolver
            .get_definition(value.type_name(), &definition.inverse_field_name)?;
    }
    Ok(())
}

/// Put `value` on one layer of `owner`'s edge. A value displaced from a resource edge is detached
/// from its own inverse.
pub(crate) fn attach(
    graph: &mut Graph,
    owner: &Identifier,
    definition: &Arc<EdgeDefinition>,
    value: &Identifier,
    layer: Layer,
    index: Option<usize>,
) -> bool {
    let outcome = graph
        .edge_entry(owner, definition)
        .insert(layer, value, index);
    match outcome {
        InsertOutcome::Unchanged => return false,
        InsertOutcome::Inserted => {}
        InsertOutcome::Displaced(displaced) => {
            if let Some(inverse) = graph.inverse_definition(definition, &displaced) {
                detach(graph, &displaced, &inverse, owner, layer);
            }
        }
    }
    graph.touch(owner, &definition.field_name, layer);
    true
}

/// Remove `value` from one layer of `owner`'s edge. Never creates an edge.
pub(crate) fn detach(
    graph: &mut Graph,
    owner: &Identifier,
    definition: &EdgeDefinition,
    value: &Identifier,
    layer: Layer,
) -> bool {
    let Some(edge) = graph.edge_mut(owner, &definition.field_name) else {
        return false;
    };
    if !edge.delete(layer, value) {
        return false;
    }
    graph.touch(owner, &definition.field_name, layer);
    true
}

pub(crate) fn add_member(
    graph: &mut Graph,
    record: &Identifier,
    definition: &Arc<EdgeDefinition>,
    value: &Identifier,
    layer: Layer,
    index: Option<usize>,
) -> bool {
    if !attach(graph, record, definition, value, layer, index) {
        return false;
    }
    if let Some(inverse) = graph.inverse_definition(definition, value) {
        attach(graph, value, &inverse, record, layer, None);
    }
    true
}

pub(crate) fn remove_member(
    graph: &mut Graph,
    record: &Identifier,
    definition: &Arc<EdgeDefinition>,
    value: &Identifier,
    layer: Layer,
) -> bool {
    if !detach(graph, record, definition, value, layer) {
        return false;
    }
    if let Some(inverse) = graph.inverse_definition(definition, value) {
        detach(graph, value, &inverse, record, layer);
    }
    true
}

/// Remote data arrived for this edge.
pub(crate) fn mark_received(graph: &mut Graph, record: &Identifier, field: &str) {
    if let Some(edge) = graph.edge_mut(record, field) {
        let is_empty = edge.layer_is_empty(Layer::Remote);
        let state = edge.state_mut();
        state.set(EdgeFlag::HasReceivedData, true);
        state.set(EdgeFlag::IsEmpty, is_empty);
    }
}

use serde_json::Value;

use super::{check_values, public_definition, replace_many, replace_one};
use crate::{
    error::GraphError,
    graph::{
        base::Graph,
        definition::EdgeKind,
        edge::{Edge, EdgeFlag, EdgeState, Layer},
        operations::{Links, RelationshipPayload, RelationshipValue},
    },
    identifier::Identifier,
};

/// Apply what a server document declares about one relationship. Data always lands on the
/// remote layer.
pub(crate) fn update_relationship(
    graph: &mut Graph,
    record: &Identifier,
    field: &str,
    payload: RelationshipPayload,
) -> Result<(), GraphError> {
    let definition = public_definition(graph, record, field)?;
    let shape_error = |expected: EdgeKind| GraphError::Cardinality {
        type_name: record.type_name().to_string(),
        field: field.to_string(),
        expected: expected.to_string(),
        found: definition.kind.to_string(),
    };
    match (&payload.data, definition.kind) {
        (Some(RelationshipValue::One(value)), EdgeKind::Resource) => {
            check_values(graph, record, &definition, value.as_ref())?
        }
        (Some(RelationshipValue::Many(values)), EdgeKind::Collection) => {
            check_values(graph, record, &definition, values)?
        }
        (Some(RelationshipValue::One(_)), _) => return Err(shape_error(EdgeKind::Resource)),
        (Some(RelationshipValue::Many(_)), _) => return Err(shape_error(EdgeKind::Collection)),
        (None, _) => {}
    }
    graph.edge_entry(record, &definition);

    let RelationshipPayload { data, links, meta } = payload;
    let has_data = data.is_some();
    match data {
        Some(RelationshipValue::One(value)) => {
            replace_one::replace_related_record(graph, record, field, value, Layer::Remote)?
        }
        Some(RelationshipValue::Many(values)) => {
            replace_many::replace_related_records(graph, record, field, values, Layer::Remote)?
        }
        None => {}
    }

    let changed = match graph.edge_mut(record, field) {
        Some(Edge::Resource(edge)) => {
            apply_document(&mut edge.meta, &mut edge.links, &mut edge.state, meta, links, has_data)
        }
        Some(Edge::Collection(edge)) => {
            apply_document(&mut edge.meta, &mut edge.links, &mut edge.state, meta, links, has_data)
        }
        _ => false,
    };
    if changed {
        graph.notify(record, field);
    }
    Ok(())
}

/// Store links and meta and settle the staleness flags. A related link without data is stale
/// when it is new or no data was ever received.
fn apply_document(
    stored_meta: &mut Option<Value>,
    stored_links: &mut Option<Links>,
    state: &mut EdgeState,
    meta: Option<Value>,
    links: Option<Links>,
    has_data: bool,
) -> bool {
    let mut changed = false;
    if let Some(meta) = meta {
        if stored_meta.as_ref() != Some(&meta) {
            *stored_meta = Some(meta);
            changed = true;
        }
    }

    let mut related_href_changed = false;
    let mut has_related = false;
    if let Some(links) = links {
        let previous = stored_links
            .as_ref()
            .and_then(|links| links.related_href().map(str::to_string));
        has_related = links.related_href().is_some();
        related_href_changed = has_related && links.related_href() != previous.as_deref();
        if stored_links.as_ref() != Some(&links) {
            *stored_links = Some(links);
            changed = true;
        }
    }

    let was_stale = state.is_stale();
    if has_data {
        state.set(EdgeFlag::IsStale, false);
        state.set(EdgeFlag::HasFailedLoadAttempt, false);
        state.set(EdgeFlag::HasReceivedData, true);
    } else if has_related && (related_href_changed || !state.has_received_data()) {
        state.set(EdgeFlag::IsStale, true);
    }
    changed || was_stale != state.is_stale()
}

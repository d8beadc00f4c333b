use std::collections::HashSet;

use super::subject_definition;
use crate::{
    error::GraphError,
    graph::{
        base::Graph,
        definition::EdgeKind,
        edge::{Edge, Layer, MemberList},
    },
    identifier::Identifier,
};

/// Reorder the local layer. Only a permutation of the current local members is accepted.
pub(crate) fn sort_related_records(
    graph: &mut Graph,
    record: &Identifier,
    field: &str,
    value: Vec<Identifier>,
) -> Result<(), GraphError> {
    let definition = subject_definition(graph, record, field, EdgeKind::Collection)?;
    let invalid = |reason: String| GraphError::InvalidSort {
        type_name: record.type_name().to_string(),
        field: field.to_string(),
        reason,
    };

    let local = match graph.peek(record, field) {
        Some(Edge::Collection(edge)) => edge.local.clone(),
        _ => MemberList::default(),
    };
    let unique = value.iter().collect::<HashSet<_>>().len();
    if unique != value.len() {
        return Err(invalid("duplicate members".to_string()));
    }
    if value.len() != local.len() {
        return Err(invalid(format!(
            "expected {} members, received {}",
            local.len(),
            value.len()
        )));
    }
    if let Some(stranger) = value.iter().find(|member| !local.contains(member)) {
        return Err(invalid(format!("{stranger} is not a local member")));
    }

    let Edge::Collection(edge) = graph.edge_entry(record, &definition) else {
        return Ok(());
    };
    if edge.set_order(Layer::Local, value) {
        graph.touch(record, field, Layer::Local);
    }
    Ok(())
}

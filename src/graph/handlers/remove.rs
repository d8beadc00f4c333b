use super::{check_values, remove_member, subject_definition};
use crate::{
    error::GraphError,
    graph::{base::Graph, definition::EdgeKind, edge::Layer},
    identifier::Identifier,
};

pub(crate) fn remove_from_related_records(
    graph: &mut Graph,
    record: &Identifier,
    field: &str,
    value: Vec<Identifier>,
    layer: Layer,
) -> Result<(), GraphError> {
    let definition = subject_definition(graph, record, field, EdgeKind::Collection)?;
    check_values(graph, record, &definition, &value)?;
    for member in value.iter() {
        remove_member(graph, record, &definition, member, layer);
    }
    Ok(())
}

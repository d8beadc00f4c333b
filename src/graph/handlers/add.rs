use super::{add_member, check_values, subject_definition};
use crate::{
    error::GraphError,
    graph::{base::Graph, definition::EdgeKind, edge::Layer},
    identifier::Identifier,
};

pub(crate) fn add_to_related_records(
    graph: &mut Graph,
    record: &Identifier,
    field: &str,
    value: Vec<Identifier>,
    index: Option<usize>,
    layer: Layer,
) -> Result<(), GraphError> {
    let definition = subject_definition(graph, record, field, EdgeKind::Collection)?;
    check_values(graph, record, &definition, &value)?;
    graph.edge_entry(record, &definition);

    let mut inserted = 0;
    for member in value.iter() {
        let at = index.map(|index| index.saturating_add(inserted));
        if add_member(graph, record, &definition, member, layer, at) {
            inserted += 1;
        } else {
            tracing::debug!(
                "[add_to_related_records] {} is already a member of {}.{}",
                member,
                record,
                field
            );
        }
    }
    Ok(())
}

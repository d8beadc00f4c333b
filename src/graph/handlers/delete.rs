use super::detach;
use crate::{
    graph::{
        base::Graph,
        edge::{EdgeFlag, Layer},
    },
    identifier::Identifier,
};

/// Discard every edge of `identifier` after removing it from the inverse edges of everything it
/// references, on both layers. With `dematerialize`, those inverses remember that a member went
/// away without a remote removal.
pub(crate) fn remove_identifier(graph: &mut Graph, identifier: &Identifier, dematerialize: bool) {
    let Some(edges) = graph.edges.remove(identifier.lid()) else {
        tracing::debug!("[remove_identifier] {} has no edges", identifier);
        return;
    };
    tracing::debug!(
        "[remove_identifier] {} ({} edges, dematerialize={})",
        identifier,
        edges.len(),
        dematerialize
    );

    for edge in edges.values() {
        let definition = edge.definition();
        for layer in Layer::both() {
            for member in edge.members(layer) {
                if &member == identifier {
                    continue;
                }
                let Some(inverse) = graph.inverse_definition(definition, &member) else {
                    continue;
                };
                if detach(graph, &member, &inverse, identifier, layer) && dematerialize {
                    if let Some(back) = graph.edge_mut(&member, &inverse.field_name) {
                        back.state_mut()
                            .set(EdgeFlag::HasDematerializedInverse, true);
                    }
                }
            }
        }
    }
    graph.forget_pending(identifier);
}

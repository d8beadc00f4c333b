//! Graph module: the two-layer relationship graph.
//!
//! # Module Organization
//!
//! - [`definition`]: Schema-level edge shapes and the memoizing resolver
//! - [`edge`]: Per-identifier, per-field edge state (`ResourceEdge`, `CollectionEdge`, `ImplicitEdge`)
//! - [`operations`]: The operations the graph accepts and their payload types
//! - `handlers`: One algorithm per operation kind, plus the shared inverse helpers
//! - `base`: The `Graph` orchestrator
//! - `sync`: Remote batches and the local resync pass
//!
//! ```rust
//! use relgraph::graph::{Graph, Operation};
//! ```

mod base;
pub mod definition;
pub mod edge;
mod handlers;
pub mod operations;
mod sync;

#[cfg(test)]
mod tests;

pub use base::{EdgeChange, Graph};
pub use definition::{implicit_key, DefinitionResolver, EdgeDefinition, EdgeKind};
pub use edge::{
    CollectionEdge, Edge, EdgeFlag, EdgeState, ImplicitEdge, Layer, MemberList, ResourceEdge,
};
pub use operations::{
    Link, Links, Operation, RelationshipData, RelationshipPayload, RelationshipValue,
};
pub use sync::RemoteBatch;

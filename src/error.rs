use std::{fmt, io, sync::mpsc::SendError};

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as TokioSendError;

use crate::event::GraphEvent;

/// Errors surfaced by the relationship graph.
///
/// Contract violations (`Cardinality`, `PolymorphicMismatch`, `ImplicitMutation`,
/// `UnknownRelationship`, `InvalidSort`) are detected before an operation touches any edge,
/// so a returned error always means the graph is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum GraphError {
    #[error("'{type_name}.{field}' is a {found} relationship but the operation requires a {expected} relationship")]
    Cardinality {
        type_name: String,
        field: String,
        expected: String,
        found: String,
    },
    #[error("'{type_name}.{field}' expects '{expected}' but received '{found}'. Use register_polymorphic_type() to declare '{found}' as a member of '{expected}'")]
    PolymorphicMismatch {
        type_name: String,
        field: String,
        expected: String,
        found: String,
    },
    #[error("'{type_name}.{field}' is an implicit relationship and can not be mutated directly")]
    ImplicitMutation { type_name: String, field: String },
    #[error("No relationship '{field}' is declared on '{type_name}'")]
    UnknownRelationship { type_name: String, field: String },
    #[error("Invalid sort of '{type_name}.{field}': {reason}")]
    InvalidSort {
        type_name: String,
        field: String,
        reason: String,
    },
    #[error("Remote batch error: {0}")]
    BatchState(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    /// True for the errors that indicate a caller bug rather than a bad environment.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            GraphError::Cardinality { .. }
                | GraphError::PolymorphicMismatch { .. }
                | GraphError::ImplicitMutation { .. }
                | GraphError::UnknownRelationship { .. }
                | GraphError::InvalidSort { .. }
                | GraphError::BatchState(_)
        )
    }
}

impl From<toml::de::Error> for GraphError {
    fn from(src: toml::de::Error) -> GraphError {
        GraphError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for GraphError {
    fn from(src: toml::ser::Error) -> GraphError {
        GraphError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for GraphError {
    fn from(src: JsonError) -> GraphError {
        GraphError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for GraphError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => GraphError::Config(format!("{x}")),
            _ => GraphError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for GraphError {
    fn from(x: fmt::Error) -> Self {
        GraphError::Serialization(format!("{x}"))
    }
}

impl From<SendError<GraphEvent>> for GraphError {
    fn from(x: SendError<GraphEvent>) -> Self {
        GraphError::Io(format!(
            "Channel update send Error, could not transmit change notification {:?}",
            x.0
        ))
    }
}

impl From<TokioSendError<GraphEvent>> for GraphError {
    fn from(x: TokioSendError<GraphEvent>) -> Self {
        GraphError::Io(format!(
            "Channel update send Error, could not transmit change notification {:?}",
            x.0
        ))
    }
}

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::Sender;
use tokio::sync::mpsc::UnboundedSender;

use crate::{error::GraphError, identifier::Identifier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GraphEvent {
    /// Identifier, field name
    RelationshipChanged(Identifier, String),
    /// From identifier, To identifier
    IdentifierMerged(Identifier, Identifier),
}

impl Display for GraphEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            GraphEvent::RelationshipChanged(identifier, field) => {
                write!(f, "RelationshipChanged({identifier}.{field})")
            }
            GraphEvent::IdentifierMerged(from, to) => {
                write!(f, "IdentifierMerged({from} -> {to})")
            }
        }
    }
}

/// The graph's view of the surrounding store.
///
/// The graph only says *which* edge changed; scheduling delivery to observers is the
/// implementor's job.
pub trait GraphStore {
    fn notify_change(&self, identifier: &Identifier, field: &str);

    fn notify_merged(&self, _from: &Identifier, _to: &Identifier) {}

    /// Whether `identifier` is client-created and not yet persisted.
    fn is_new(&self, identifier: &Identifier) -> bool {
        identifier.id().is_none()
    }
}

/// A [`GraphStore`] that records every notification it receives.
#[derive(Debug, Default)]
pub struct NotificationLog {
    events: Mutex<Vec<GraphEvent>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        NotificationLog::default()
    }

    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<GraphEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count_for(&self, identifier: &Identifier, field: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| {
                matches!(event, GraphEvent::RelationshipChanged(i, f) if i == identifier && f == field)
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl GraphStore for NotificationLog {
    fn notify_change(&self, identifier: &Identifier, field: &str) {
        self.events.lock().push(GraphEvent::RelationshipChanged(
            identifier.clone(),
            field.to_string(),
        ));
    }

    fn notify_merged(&self, from: &Identifier, to: &Identifier) {
        self.events
            .lock()
            .push(GraphEvent::IdentifierMerged(from.clone(), to.clone()));
    }
}

impl GraphStore for Sender<GraphEvent> {
    fn notify_change(&self, identifier: &Identifier, field: &str) {
        if let Err(send_error) = self.send(GraphEvent::RelationshipChanged(
            identifier.clone(),
            field.to_string(),
        )) {
            tracing::warn!("[GraphStore::notify_change] {}", GraphError::from(send_error));
        }
    }

    fn notify_merged(&self, from: &Identifier, to: &Identifier) {
        if let Err(send_error) = self.send(GraphEvent::IdentifierMerged(from.clone(), to.clone())) {
            tracing::warn!("[GraphStore::notify_merged] {}", GraphError::from(send_error));
        }
    }
}

impl GraphStore for UnboundedSender<GraphEvent> {
    fn notify_change(&self, identifier: &Identifier, field: &str) {
        if let Err(send_error) = self.send(GraphEvent::RelationshipChanged(
            identifier.clone(),
            field.to_string(),
        )) {
            tracing::warn!("[GraphStore::notify_change] {}", GraphError::from(send_error));
        }
    }

    fn notify_merged(&self, from: &Identifier, to: &Identifier) {
        if let Err(send_error) = self.send(GraphEvent::IdentifierMerged(from.clone(), to.clone())) {
            tracing::warn!("[GraphStore::notify_merged] {}", GraphError::from(send_error));
        }
    }
}

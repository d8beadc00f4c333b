//! Graph operations and the payload shapes they carry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

use crate::identifier::Identifier;

/// A link object, either a bare href or `{ href, meta }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link {
    Href(String),
    Object {
        href: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
}

impl Link {
    pub fn href(&self) -> &str {
        match self {
            Link::Href(href) => href,
            Link::Object { href, .. } => href,
        }
    }
}

impl From<&str> for Link {
    fn from(href: &str) -> Self {
        Link::Href(href.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Link>,
    #[serde(default, rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_link: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<Link>,
}

impl Links {
    pub fn related(href: &str) -> Self {
        Links {
            related: Some(Link::from(href)),
            ..Links::default()
        }
    }

    pub fn related_href(&self) -> Option<&str> {
        self.related.as_ref().map(Link::href)
    }
}

/// Relationship data: `One(None)` is an explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RelationshipValue {
    One(Option<Identifier>),
    Many(Vec<Identifier>),
}

/// What a parsed server document declares about one relationship.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationshipPayload {
    /// Absent means the document said nothing about membership.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RelationshipValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl RelationshipPayload {
    pub fn one(value: Option<Identifier>) -> Self {
        RelationshipPayload {
            data: Some(RelationshipValue::One(value)),
            ..RelationshipPayload::default()
        }
    }

    pub fn many(values: Vec<Identifier>) -> Self {
        RelationshipPayload {
            data: Some(RelationshipValue::Many(values)),
            ..RelationshipPayload::default()
        }
    }

    pub fn with_links(mut self, links: Links) -> Self {
        self.links = Some(links);
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Read view of an edge's local layer.
pub type RelationshipData = RelationshipPayload;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op")]
pub enum Operation {
    AddToRelatedRecords {
        record: Identifier,
        field: String,
        value: Vec<Identifier>,
        /// Splice position for the first value; consecutive values follow it.
        index: Option<usize>,
    },
    RemoveFromRelatedRecords {
        record: Identifier,
        field: String,
        value: Vec<Identifier>,
    },
    ReplaceRelatedRecord {
        record: Identifier,
        field: String,
        value: Option<Identifier>,
    },
    ReplaceRelatedRecords {
        record: Identifier,
        field: String,
        value: Vec<Identifier>,
    },
    /// Reorders the local layer; `value` must be a permutation of the current local members.
    SortRelatedRecords {
        record: Identifier,
        field: String,
        value: Vec<Identifier>,
    },
    /// Always applied to the remote layer.
    UpdateRelationship {
        record: Identifier,
        field: String,
        payload: RelationshipPayload,
    },
    /// Rewrite every reference to `record` into `value`.
    MergeIdentifiers { record: Identifier, value: Identifier },
    DeleteRecord { record: Identifier },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddToRelatedRecords { .. } => "addToRelatedRecords",
            Operation::RemoveFromRelatedRecords { .. } => "removeFromRelatedRecords",
            Operation::ReplaceRelatedRecord { .. } => "replaceRelatedRecord",
            Operation::ReplaceRelatedRecords { .. } => "replaceRelatedRecords",
            Operation::SortRelatedRecords { .. } => "sortRelatedRecords",
            Operation::UpdateRelationship { .. } => "updateRelationship",
            Operation::MergeIdentifiers { .. } => "mergeIdentifiers",
            Operation::DeleteRecord { .. } => "deleteRecord",
        }
    }

    pub fn record(&self) -> &Identifier {
        match self {
            Operation::AddToRelatedRecords { record, .. }
            | Operation::RemoveFromRelatedRecords { record, .. }
            | Operation::ReplaceRelatedRecord { record, .. }
            | Operation::ReplaceRelatedRecords { record, .. }
            | Operation::SortRelatedRecords { record, .. }
            | Operation::UpdateRelationship { record, .. }
            | Operation::MergeIdentifiers { record, .. }
            | Operation::DeleteRecord { record } => record,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Operation::AddToRelatedRecords { field, .. }
            | Operation::RemoveFromRelatedRecords { field, .. }
            | Operation::ReplaceRelatedRecord { field, .. }
            | Operation::ReplaceRelatedRecords { field, .. }
            | Operation::SortRelatedRecords { field, .. }
            | Operation::UpdateRelationship { field, .. } => Some(field),
            Operation::MergeIdentifiers { .. } | Operation::DeleteRecord { .. } => None,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.field() {
            Some(field) => write!(f, "{}({}.{})", self.name(), self.record(), field),
            None => write!(f, "{}({})", self.name(), self.record()),
        }
    }
}

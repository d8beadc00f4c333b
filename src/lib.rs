//! # relgraph
//!
//! A client-side relationship graph that keeps the edges between resources consistent across a
//! remote (last known canonical) layer and a local (in-flight) layer.
//!
//! ## Overview
//!
//! Every relationship field of every resource identifier is an edge. Each edge stores both
//! layers, and every mutation is mirrored onto the inverse edge of each related identifier, so
//! `user.pets` and `pet.owner` always agree. Remote payloads only write the remote layer; a
//! deferred resync pass rebuilds the local layer afterwards without dropping local intent such as
//! unsaved records.
//!
//! ### Key Features
//!
//! - **Two layers**: local and remote state per edge, with additions/removals bookkeeping
//! - **Inverse symmetry**: declared inverses are cross-linked and undeclared ones are synthesized
//! - **Polymorphism**: concrete types can be registered as members of an abstract family
//! - **Identifier merge**: a client-created identifier can be folded into its persisted twin
//! - **Batching**: remote operations are bracketed by a scope guard, notifications are deduplicated
//!
//! ## Architecture
//!
//! - **[`identifier`]**: `Identifier` handles and an in-memory `IdentifierCache`
//! - **[`schema`]**: Declared relationship fields per resource type
//! - **[`graph`]**: `Graph`, edge definitions, edges, operations and remote batching
//! - **[`event`]**: `GraphStore`, the sink for change notifications
//! - **[`config`]**: Runtime configuration
//!
//! ## Quick Start
//!
//! ```rust
//! use relgraph::{
//!     event::NotificationLog,
//!     graph::{Graph, Layer, Operation},
//!     identifier::{IdentifierCache, IdentifierRegistry, ResourcePointer},
//!     schema::{RelationshipField, ResourceSchema, SchemaRegistry},
//! };
//! use std::sync::Arc;
//!
//! let schema = SchemaRegistry::new();
//! schema.register(
//!     "user",
//!     ResourceSchema::new(vec![RelationshipField::has_many("pets", "pet").inverse("owner")]),
//! );
//! schema.register(
//!     "pet",
//!     ResourceSchema::new(vec![RelationshipField::belongs_to("owner", "user").inverse("pets")]),
//! );
//!
//! let log = Arc::new(NotificationLog::new());
//! let mut graph = Graph::new(schema, log.clone());
//! let cache = IdentifierCache::new();
//! let user = cache.resolve_identifier(&ResourcePointer::new("user", "1"));
//! let pet = cache.resolve_identifier(&ResourcePointer::new("pet", "5"));
//!
//! graph
//!     .update(
//!         Operation::ReplaceRelatedRecords {
//!             record: user.clone(),
//!             field: "pets".to_string(),
//!             value: vec![pet.clone()],
//!         },
//!         true,
//!     )
//!     .unwrap();
//!
//! let owner = graph.get(&pet, "owner").unwrap();
//! assert_eq!(owner.members(Layer::Local), vec![user.clone()]);
//! assert_eq!(log.count_for(&user, "pets"), 1);
//! ```
//!
//! ### Batching remote payloads
//!
//! ```rust
//! # use relgraph::{event::NotificationLog, graph::{Graph, Layer, Operation}, identifier::Identifier, schema::{RelationshipField, ResourceSchema, SchemaRegistry}};
//! # use std::sync::Arc;
//! # let schema = SchemaRegistry::new();
//! # schema.register("user", ResourceSchema::new(vec![RelationshipField::belongs_to("bestFriend", "user").inverse("bestFriend")]));
//! # let mut graph = Graph::new(schema, Arc::new(NotificationLog::new()));
//! # let a = Identifier::new("user", Some("1".to_string()), "@lid:user-1");
//! # let b = Identifier::new("user", Some("2".to_string()), "@lid:user-2");
//! {
//!     let mut batch = graph.begin_remote_batch();
//!     batch
//!         .update(
//!             Operation::ReplaceRelatedRecord {
//!                 record: a.clone(),
//!                 field: "bestFriend".to_string(),
//!                 value: Some(b.clone()),
//!             },
//!             true,
//!         )
//!         .unwrap();
//!     // Local state catches up when the batch closes.
//!     assert!(batch.peek(&a, "bestFriend").unwrap().members(Layer::Local).is_empty());
//! }
//! assert_eq!(graph.peek(&b, "bestFriend").unwrap().members(Layer::Local), vec![a]);
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod identifier;
pub mod schema;

pub use error::*;

//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use relgraph::{
    config::GraphConfig,
    event::NotificationLog,
    graph::{Graph, Layer},
    identifier::{Identifier, IdentifierCache, IdentifierRegistry, ResourcePointer},
    schema::SchemaRegistry,
};
use std::sync::Arc;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// The relationship schema shared by the scenarios, in its TOML form.
pub const USER_SCHEMA: &str = r#"
[[relationships]]
name = "pets"
kind = "has-many"
type = "pet"
inverse = "owner"

[[relationships]]
name = "bestFriend"
kind = "belongs-to"
type = "user"
inverse = "bestFriend"

[[relationships]]
name = "friends"
kind = "has-many"
type = "user"
inverse = "friends"
"#;

pub const PET_SCHEMA: &str = r#"
[[relationships]]
name = "owner"
kind = "belongs-to"
type = "user"
inverse = "pets"
async = true
"#;

pub const COMMENT_SCHEMA: &str = r#"
[[relationships]]
name = "commentable"
kind = "belongs-to"
type = "commentable"
inverse = "comments"
polymorphic = true
"#;

pub const POST_SCHEMA: &str = r#"
[[relationships]]
name = "comments"
kind = "has-many"
type = "comment"
inverse = "commentable"
as = "commentable"
"#;

pub fn schema() -> SchemaRegistry {
    let schema = SchemaRegistry::new();
    schema.register_toml("user", USER_SCHEMA).unwrap();
    schema.register_toml("pet", PET_SCHEMA).unwrap();
    schema.register_toml("comment", COMMENT_SCHEMA).unwrap();
    schema.register_toml("post", POST_SCHEMA).unwrap();
    schema
}

pub struct Harness {
    pub graph: Graph,
    pub log: Arc<NotificationLog>,
    pub cache: IdentifierCache,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Harness {
        Harness::with_config(GraphConfig {
            verify_invariants: true,
            ..GraphConfig::default()
        })
    }

    pub fn with_config(config: GraphConfig) -> Harness {
        init_logging();
        let log = Arc::new(NotificationLog::new());
        Harness {
            graph: Graph::with_config(schema(), log.clone(), config),
            log,
            cache: IdentifierCache::new(),
        }
    }

    pub fn ident(&self, type_name: &str, id: &str) -> Identifier {
        self.cache
            .resolve_identifier(&ResourcePointer::new(type_name, id))
    }

    pub fn local(&self, identifier: &Identifier, field: &str) -> Vec<Identifier> {
        self.graph
            .peek(identifier, field)
            .map(|edge| edge.members(Layer::Local))
            .unwrap_or_default()
    }

    pub fn remote(&self, identifier: &Identifier, field: &str) -> Vec<Identifier> {
        self.graph
            .peek(identifier, field)
            .map(|edge| edge.members(Layer::Remote))
            .unwrap_or_default()
    }

    pub fn assert_consistent(&self) {
        let errors = self.graph.check_invariants();
        assert!(errors.is_empty(), "invariants violated: {errors:#?}");
    }
}

//! Tests for Graph functionality

use super::*;
use crate::{
    config::GraphConfig,
    error::GraphError,
    event::{GraphEvent, NotificationLog},
    identifier::{Identifier, IdentifierCache, IdentifierRegistry, ResourcePointer},
    schema::{RelationshipField, ResourceSchema, SchemaRegistry},
};
use std::sync::Arc;
use test_log::test;

struct Fixture {
    graph: Graph,
    log: Arc<NotificationLog>,
    cache: IdentifierCache,
}

impl Fixture {
    fn new() -> Fixture {
        let schema = SchemaRegistry::new();
        schema.register(
            "user",
            ResourceSchema::new(vec![
                RelationshipField::has_many("pets", "pet").inverse("owner"),
                RelationshipField::belongs_to("bestFriend", "user").inverse("bestFriend"),
                RelationshipField::has_many("tags", "tag"),
            ]),
        );
        schema.register(
            "pet",
            ResourceSchema::new(vec![RelationshipField::belongs_to("owner", "user")
                .inverse("pets")
                .asynchronous()]),
        );
        schema.register(
            "comment",
            ResourceSchema::new(vec![RelationshipField::belongs_to(
                "commentable",
                "commentable",
            )
            .inverse("comments")
            .polymorphic()]),
        );
        schema.register(
            "post",
            ResourceSchema::new(vec![RelationshipField::has_many("comments", "comment")
                .inverse("commentable")
                .conforms_to("commentable")]),
        );
        let log = Arc::new(NotificationLog::new());
        let config = GraphConfig {
            verify_invariants: true,
            ..GraphConfig::default()
        };
        Fixture {
            graph: Graph::with_config(schema, log.clone(), config),
            log,
            cache: IdentifierCache::new(),
        }
    }

    fn ident(&self, type_name: &str, id: &str) -> Identifier {
        self.cache
            .resolve_identifier(&ResourcePointer::new(type_name, id))
    }

    fn local(&self, identifier: &Identifier, field: &str) -> Vec<Identifier> {
        self.members(identifier, field, Layer::Local)
    }

    fn remote(&self, identifier: &Identifier, field: &str) -> Vec<Identifier> {
        self.members(identifier, field, Layer::Remote)
    }

    fn members(&self, identifier: &Identifier, field: &str, layer: Layer) -> Vec<Identifier> {
        self.graph
            .peek(identifier, field)
            .map(|edge| edge.members(layer))
            .unwrap_or_default()
    }
}

fn add(record: &Identifier, field: &str, value: Vec<Identifier>) -> Operation {
    Operation::AddToRelatedRecords {
        record: record.clone(),
        field: field.to_string(),
        value,
        index: None,
    }
}

fn replace_many(record: &Identifier, field: &str, value: Vec<Identifier>) -> Operation {
    Operation::ReplaceRelatedRecords {
        record: record.clone(),
        field: field.to_string(),
        value,
    }
}

fn replace_one(record: &Identifier, field: &str, value: Option<Identifier>) -> Operation {
    Operation::ReplaceRelatedRecord {
        record: record.clone(),
        field: field.to_string(),
        value,
    }
}

#[test]
fn test_local_add_updates_inverse_and_is_idempotent() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let pet = fx.ident("pet", "5");

    fx.graph.update(add(&user, "pets", vec![pet.clone()]), false).unwrap();
    assert_eq!(fx.local(&user, "pets"), vec![pet.clone()]);
    assert_eq!(fx.local(&pet, "owner"), vec![user.clone()]);
    assert!(fx.remote(&user, "pets").is_empty());
    assert_eq!(fx.log.count_for(&user, "pets"), 1);
    assert_eq!(fx.log.count_for(&pet, "owner"), 1);

    fx.log.take();
    fx.graph.update(add(&user, "pets", vec![pet.clone()]), false).unwrap();
    assert_eq!(fx.local(&user, "pets"), vec![pet.clone()]);
    assert!(fx.log.is_empty());
    assert!(fx.graph.check_invariants().is_empty());
}

#[test]
fn test_remove_absent_member_is_noop() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let pet = fx.ident("pet", "5");

    fx.graph
        .update(
            Operation::RemoveFromRelatedRecords {
                record: user.clone(),
                field: "pets".to_string(),
                value: vec![pet.clone()],
            },
            false,
        )
        .unwrap();
    assert!(fx.graph.peek(&user, "pets").is_none());
    assert!(fx.log.is_empty());
}

#[test]
fn test_add_at_index_splices() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let (p1, p2, a, b) = (
        fx.ident("pet", "1"),
        fx.ident("pet", "2"),
        fx.ident("pet", "a"),
        fx.ident("pet", "b"),
    );
    fx.graph
        .update(add(&user, "pets", vec![p1.clone(), p2.clone()]), false)
        .unwrap();
    fx.graph
        .update(
            Operation::AddToRelatedRecords {
                record: user.clone(),
                field: "pets".to_string(),
                value: vec![a.clone(), b.clone()],
                index: Some(1),
            },
            false,
        )
        .unwrap();
    assert_eq!(fx.local(&user, "pets"), vec![p1, a, b, p2]);
}

#[test]
fn test_add_past_end_appends_in_order() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let (p1, p2, a, b) = (
        fx.ident("pet", "1"),
        fx.ident("pet", "2"),
        fx.ident("pet", "a"),
        fx.ident("pet", "b"),
    );
    fx.graph
        .update(add(&user, "pets", vec![p1.clone(), p2.clone()]), false)
        .unwrap();
    fx.graph
        .update(
            Operation::AddToRelatedRecords {
                record: user.clone(),
                field: "pets".to_string(),
                value: vec![a.clone(), b.clone()],
                index: Some(usize::MAX),
            },
            false,
        )
        .unwrap();
    assert_eq!(fx.local(&user, "pets"), vec![p1, p2, a, b]);
}

#[test]
fn test_reorder_notifies_once() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let (p1, p2) = (fx.ident("pet", "1"), fx.ident("pet", "2"));

    fx.graph
        .update(replace_many(&user, "pets", vec![p1.clone(), p2.clone()]), true)
        .unwrap();
    fx.log.take();

    fx.graph
        .update(replace_many(&user, "pets", vec![p2.clone(), p1.clone()]), true)
        .unwrap();
    assert_eq!(fx.local(&user, "pets"), vec![p2.clone(), p1.clone()]);
    assert_eq!(fx.log.count_for(&user, "pets"), 1);
    assert_eq!(fx.log.count_for(&p1, "owner"), 0);
}

#[test]
fn test_remote_replace_retains_new_local_member() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let (x, y) = (fx.ident("pet", "x"), fx.ident("pet", "y"));
    let created = fx.cache.create_identifier("pet");

    fx.graph
        .update(replace_many(&user, "pets", vec![x.clone(), y.clone()]), true)
        .unwrap();
    fx.graph
        .update(add(&user, "pets", vec![created.clone()]), false)
        .unwrap();
    fx.graph
        .update(replace_many(&user, "pets", vec![x.clone()]), true)
        .unwrap();

    assert_eq!(fx.local(&user, "pets"), vec![x.clone(), created.clone()]);
    assert_eq!(fx.remote(&user, "pets"), vec![x.clone()]);
    assert!(fx.local(&y, "owner").is_empty());
    assert_eq!(fx.local(&created, "owner"), vec![user.clone()]);
}

#[test]
fn test_remote_batch_defers_resync_and_notifications() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let pet = fx.ident("pet", "1");
    {
        let mut batch = fx.graph.begin_remote_batch();
        batch
            .update(replace_many(&user, "pets", vec![pet.clone()]), true)
            .unwrap();
        assert!(batch.is_in_batch());
        assert!(batch.transaction_len() >= 2);
        let edge = batch.peek(&user, "pets").unwrap();
        assert!(edge.members(Layer::Local).is_empty());
        assert_eq!(edge.members(Layer::Remote), vec![pet.clone()]);
        assert!(fx.log.is_empty());
    }
    assert!(!fx.graph.is_in_batch());
    assert_eq!(fx.local(&user, "pets"), vec![pet.clone()]);
    assert_eq!(fx.local(&pet, "owner"), vec![user.clone()]);
    assert_eq!(fx.log.count_for(&user, "pets"), 1);
    assert_eq!(fx.graph.transaction_len(), 0);
}

#[test]
fn test_nested_batches_resync_on_outermost_close() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let pet = fx.ident("pet", "1");

    let mut outer = fx.graph.begin_remote_batch();
    {
        let mut inner = outer.begin_remote_batch();
        inner
            .update(replace_one(&pet, "owner", Some(user.clone())), true)
            .unwrap();
        inner.close().unwrap();
    }
    assert!(outer.peek(&pet, "owner").unwrap().members(Layer::Local).is_empty());
    outer.close().unwrap();
    assert_eq!(fx.local(&pet, "owner"), vec![user.clone()]);
    assert_eq!(fx.local(&user, "pets"), vec![pet]);
}

#[test]
fn test_cardinality_violation_leaves_graph_unchanged() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let pet = fx.ident("pet", "1");

    let result = fx
        .graph
        .update(replace_one(&user, "pets", Some(pet.clone())), false);
    assert_eq!(
        result,
        Err(GraphError::Cardinality {
            type_name: "user".to_string(),
            field: "pets".to_string(),
            expected: "resource".to_string(),
            found: "collection".to_string(),
        })
    );
    let result = fx.graph.update(add(&pet, "owner", vec![user.clone()]), false);
    assert!(matches!(result, Err(GraphError::Cardinality { .. })));
    assert_eq!(fx.graph.edge_count(), 0);
    assert!(fx.log.is_empty());
}

#[test]
fn test_unregistered_type_is_rejected() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let dog = fx.ident("dog", "1");

    let result = fx.graph.update(add(&user, "pets", vec![dog.clone()]), false);
    assert!(matches!(
        result,
        Err(GraphError::PolymorphicMismatch { ref expected, ref found, .. })
            if expected == "pet" && found == "dog"
    ));
    assert_eq!(fx.graph.edge_count(), 0);

    assert!(fx.graph.register_polymorphic_type("pet", "dog"));
    fx.graph.update(add(&user, "pets", vec![dog.clone()]), false).unwrap();
    assert_eq!(fx.local(&dog, "owner"), vec![user.clone()]);
}

#[test]
fn test_conforming_type_satisfies_polymorphic_field() {
    let mut fx = Fixture::new();
    let comment = fx.ident("comment", "1");
    let post = fx.ident("post", "1");
    let user = fx.ident("user", "1");

    let result = fx
        .graph
        .update(replace_one(&comment, "commentable", Some(user)), false);
    assert!(matches!(result, Err(GraphError::PolymorphicMismatch { .. })));

    fx.graph
        .update(replace_one(&comment, "commentable", Some(post.clone())), false)
        .unwrap();
    assert_eq!(fx.local(&post, "comments"), vec![comment.clone()]);
    assert!(fx.graph.resolver.is_registered("commentable", "post"));
}

#[test]
fn test_implicit_counterpart_is_internal() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let tag = fx.ident("tag", "rust");
    let key = implicit_key("user", "tags");

    fx.graph.update(add(&user, "tags", vec![tag.clone()]), false).unwrap();
    match fx.graph.peek(&tag, &key) {
        Some(Edge::Implicit(edge)) => assert!(edge.local.contains(&user)),
        other => panic!("expected an implicit edge, got {other:?}"),
    }
    assert_eq!(fx.log.events().len(), 1);
    assert!(matches!(
        fx.graph.get(&tag, &key),
        Err(GraphError::UnknownRelationship { .. })
    ));
    assert!(matches!(
        fx.graph.update(add(&tag, &key, vec![user.clone()]), false),
        Err(GraphError::ImplicitMutation { .. })
    ));

    fx.graph
        .update(
            Operation::RemoveFromRelatedRecords {
                record: user.clone(),
                field: "tags".to_string(),
                value: vec![tag.clone()],
            },
            false,
        )
        .unwrap();
    assert!(fx.local(&tag, &key).is_empty());
}

#[test]
fn test_merge_rewrites_references_on_both_layers() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let created = fx.cache.create_identifier("pet");
    let persisted = fx.ident("pet", "9");

    fx.graph
        .update(replace_many(&user, "pets", vec![created.clone()]), true)
        .unwrap();
    assert_eq!(fx.local(&user, "pets"), vec![created.clone()]);

    fx.graph
        .update(
            Operation::MergeIdentifiers {
                record: created.clone(),
                value: persisted.clone(),
            },
            false,
        )
        .unwrap();
    assert_eq!(fx.local(&user, "pets"), vec![persisted.clone()]);
    assert_eq!(fx.remote(&user, "pets"), vec![persisted.clone()]);
    assert_eq!(fx.local(&persisted, "owner"), vec![user.clone()]);
    assert_eq!(fx.graph.peek(&persisted, "owner").unwrap().identifier(), &persisted);
    assert!(!fx.graph.has(&created));
    for other in fx.graph.identifiers() {
        for field in ["pets", "owner", "bestFriend"] {
            if let Some(edge) = fx.graph.peek(&other, field) {
                assert!(!edge.referenced().contains(&created));
            }
        }
    }
    assert!(fx
        .log
        .events()
        .contains(&GraphEvent::IdentifierMerged(created, persisted)));
}

#[test]
fn test_merge_unions_colliding_collections() {
    let mut fx = Fixture::new();
    let created = fx.cache.create_identifier("user");
    let persisted = fx.ident("user", "9");
    let (p1, p2) = (fx.ident("pet", "1"), fx.ident("pet", "2"));

    fx.graph
        .update(replace_many(&persisted, "pets", vec![p1.clone()]), true)
        .unwrap();
    fx.graph
        .update(add(&created, "pets", vec![p2.clone()]), false)
        .unwrap();
    fx.graph
        .update(
            Operation::MergeIdentifiers {
                record: created.clone(),
                value: persisted.clone(),
            },
            false,
        )
        .unwrap();

    assert_eq!(fx.local(&persisted, "pets"), vec![p1.clone(), p2.clone()]);
    assert_eq!(fx.remote(&persisted, "pets"), vec![p1]);
    assert_eq!(fx.local(&p2, "owner"), vec![persisted.clone()]);
    match fx.graph.peek(&persisted, "pets") {
        Some(Edge::Collection(edge)) => assert!(edge.is_addition(&p2)),
        other => panic!("expected a collection edge, got {other:?}"),
    }
}

#[test]
fn test_merge_keeps_target_resource_value() {
    let mut fx = Fixture::new();
    let created = fx.cache.create_identifier("pet");
    let persisted = fx.ident("pet", "9");
    let (alice, bob) = (fx.ident("user", "alice"), fx.ident("user", "bob"));

    fx.graph
        .update(replace_one(&persisted, "owner", Some(alice.clone())), true)
        .unwrap();
    fx.graph
        .update(replace_one(&created, "owner", Some(bob.clone())), false)
        .unwrap();
    fx.graph
        .update(
            Operation::MergeIdentifiers {
                record: created,
                value: persisted.clone(),
            },
            false,
        )
        .unwrap();

    assert_eq!(fx.local(&persisted, "owner"), vec![alice.clone()]);
    assert_eq!(fx.local(&alice, "pets"), vec![persisted]);
    assert!(fx.local(&bob, "pets").is_empty());
}

#[test]
fn test_unload_flags_dematerialized_inverse() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let pet = fx.ident("pet", "1");

    fx.graph
        .update(replace_many(&user, "pets", vec![pet.clone()]), true)
        .unwrap();
    fx.graph.unload(&pet);

    assert!(!fx.graph.has(&pet));
    let edge = fx.graph.peek(&user, "pets").unwrap();
    assert!(edge.members(Layer::Local).is_empty());
    assert!(edge.members(Layer::Remote).is_empty());
    assert!(edge.state().has_dematerialized_inverse());
}

#[test]
fn test_silenced_unload() {
    let mut fx = Fixture::new();
    fx.graph.config.silence_unload_notifications = true;
    let user = fx.ident("user", "1");
    let pet = fx.ident("pet", "1");

    fx.graph
        .update(replace_many(&user, "pets", vec![pet.clone()]), true)
        .unwrap();
    fx.log.take();
    fx.graph.unload(&pet);
    assert_eq!(fx.log.count_for(&user, "pets"), 0);
}

#[test]
fn test_delete_record_clears_inverses() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let friend = fx.ident("user", "2");

    fx.graph
        .update(replace_one(&user, "bestFriend", Some(friend.clone())), false)
        .unwrap();
    fx.graph
        .update(Operation::DeleteRecord { record: friend.clone() }, false)
        .unwrap();
    assert!(fx.local(&user, "bestFriend").is_empty());
    assert!(!fx.graph.peek(&user, "bestFriend").unwrap().state().has_dematerialized_inverse());
}

#[test]
fn test_changed_and_rollback() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let (p1, p2, p3) = (fx.ident("pet", "1"), fx.ident("pet", "2"), fx.ident("pet", "3"));

    fx.graph
        .update(replace_many(&user, "pets", vec![p1.clone(), p2.clone()]), true)
        .unwrap();
    fx.graph
        .update(
            Operation::RemoveFromRelatedRecords {
                record: user.clone(),
                field: "pets".to_string(),
                value: vec![p2.clone()],
            },
            false,
        )
        .unwrap();
    fx.graph.update(add(&user, "pets", vec![p3.clone()]), false).unwrap();

    let changes = fx.graph.changed(&user);
    assert_eq!(
        changes.get("pets"),
        Some(&EdgeChange::Collection {
            additions: vec![p3.clone()],
            removals: vec![p2.clone()],
            reordered: false,
        })
    );
    assert_eq!(
        fx.graph.changed(&p2).get("owner"),
        Some(&EdgeChange::Resource {
            remote: Some(user.clone()),
            local: None,
        })
    );

    assert_eq!(fx.graph.rollback(&user), vec!["pets".to_string()]);
    assert_eq!(fx.local(&user, "pets"), vec![p1, p2.clone()]);
    assert!(fx.graph.changed(&user).is_empty());
    assert!(fx.graph.changed(&p2).is_empty());
    assert!(fx.local(&p3, "owner").is_empty());
}

#[test]
fn test_sort_requires_permutation() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let (p1, p2, p3) = (fx.ident("pet", "1"), fx.ident("pet", "2"), fx.ident("pet", "3"));
    fx.graph
        .update(replace_many(&user, "pets", vec![p1.clone(), p2.clone()]), true)
        .unwrap();

    let sort = |value: Vec<Identifier>| Operation::SortRelatedRecords {
        record: user.clone(),
        field: "pets".to_string(),
        value,
    };
    assert!(matches!(
        fx.graph.update(sort(vec![p1.clone(), p3.clone()]), false),
        Err(GraphError::InvalidSort { .. })
    ));
    assert!(matches!(
        fx.graph.update(sort(vec![p1.clone()]), false),
        Err(GraphError::InvalidSort { .. })
    ));

    fx.log.take();
    fx.graph.update(sort(vec![p2.clone(), p1.clone()]), false).unwrap();
    assert_eq!(fx.local(&user, "pets"), vec![p2.clone(), p1.clone()]);
    assert_eq!(fx.remote(&user, "pets"), vec![p1.clone(), p2.clone()]);
    assert_eq!(fx.log.count_for(&user, "pets"), 1);
    assert!(matches!(
        fx.graph.changed(&user).get("pets"),
        Some(EdgeChange::Collection { reordered: true, .. })
    ));
}

#[test]
fn test_releasability_follows_async_inverse() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let pet = fx.ident("pet", "1");
    let created = fx.cache.create_identifier("user");

    fx.graph.update(add(&user, "pets", vec![pet.clone()]), false).unwrap();
    fx.graph.update(add(&created, "pets", vec![]), false).unwrap();
    assert!(!fx.graph.is_releasable(&user));
    assert!(fx.graph.is_releasable(&pet));
    assert!(fx.graph.is_releasable(&created));
}

#[test]
fn test_failed_load_cleared_by_data() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let pet = fx.ident("pet", "1");

    fx.graph.mark_load_failed(&user, "pets").unwrap();
    assert!(fx.graph.peek(&user, "pets").unwrap().state().has_failed_load_attempt());

    fx.graph
        .update(
            Operation::UpdateRelationship {
                record: user.clone(),
                field: "pets".to_string(),
                payload: RelationshipPayload::many(vec![pet]),
            },
            true,
        )
        .unwrap();
    let state = fx.graph.peek(&user, "pets").unwrap().state().clone();
    assert!(!state.has_failed_load_attempt());
    assert!(state.has_received_data());
    assert!(!state.is_stale());
}

#[test]
fn test_get_data_reflects_local_layer() {
    let mut fx = Fixture::new();
    let user = fx.ident("user", "1");
    let pet = fx.ident("pet", "1");

    assert_eq!(
        fx.graph.get_data(&user, "pets").unwrap(),
        RelationshipData::default()
    );
    fx.graph.update(add(&user, "pets", vec![pet.clone()]), false).unwrap();
    assert_eq!(
        fx.graph.get_data(&user, "pets").unwrap().data,
        Some(RelationshipValue::Many(vec![pet.clone()]))
    );
    assert_eq!(
        fx.graph.get_data(&pet, "owner").unwrap().data,
        Some(RelationshipValue::One(Some(user)))
    );
    assert!(fx.graph.get_data(&pet, "nope").is_err());
}

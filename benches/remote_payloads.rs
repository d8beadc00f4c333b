//! Performance benchmarks for remote payload ingestion
//!
//! These benchmarks measure:
//! - Bulk collection replacement inside one remote batch
//! - Resync cost when local intent has to survive a remote update
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use relgraph::{
    event::NotificationLog,
    graph::{Graph, Operation, RelationshipPayload},
    identifier::{Identifier, IdentifierCache, IdentifierRegistry, ResourcePointer},
    schema::{RelationshipField, ResourceSchema, SchemaRegistry},
};
use std::sync::Arc;

const USERS: usize = 100;
const PETS_PER_USER: usize = 20;

fn setup_graph() -> Graph {
    let schema = SchemaRegistry::new();
    schema.register(
        "user",
        ResourceSchema::new(vec![RelationshipField::has_many("pets", "pet").inverse("owner")]),
    );
    schema.register(
        "pet",
        ResourceSchema::new(vec![RelationshipField::belongs_to("owner", "user").inverse("pets")]),
    );
    Graph::new(schema, Arc::new(NotificationLog::new()))
}

fn setup_corpus(cache: &IdentifierCache) -> Vec<(Identifier, Vec<Identifier>)> {
    (0..USERS)
        .map(|u| {
            let user = cache.resolve_identifier(&ResourcePointer::new("user", u.to_string()));
            let pets = (0..PETS_PER_USER)
                .map(|p| {
                    let id = format!("{u}-{p}");
                    cache.resolve_identifier(&ResourcePointer::new("pet", id))
                })
                .collect();
            (user, pets)
        })
        .collect()
}

fn push_all(graph: &mut Graph, corpus: &[(Identifier, Vec<Identifier>)], reversed: bool) {
    let mut batch = graph.begin_remote_batch();
    for (user, pets) in corpus {
        let mut pets = pets.clone();
        if reversed {
            pets.reverse();
        }
        batch
            .update(
                Operation::UpdateRelationship {
                    record: user.clone(),
                    field: "pets".to_string(),
                    payload: RelationshipPayload::many(pets),
                },
                true,
            )
            .unwrap();
    }
    batch.close().unwrap();
}

// Benchmark: one batch of collection payloads into an empty graph
fn bench_bulk_remote_replace(c: &mut Criterion) {
    let cache = IdentifierCache::new();
    let corpus = setup_corpus(&cache);

    c.bench_function("bulk_remote_replace", |b| {
        b.iter_batched(
            setup_graph,
            |mut graph| {
                push_all(&mut graph, &corpus, false);
                graph
            },
            BatchSize::SmallInput,
        )
    });
}

// Benchmark: the payloads again, reordered, after every user gained an unsaved pet locally
fn bench_resync_with_local_intent(c: &mut Criterion) {
    let cache = IdentifierCache::new();
    let corpus = setup_corpus(&cache);

    c.bench_function("resync_with_local_intent", |b| {
        b.iter_batched(
            || {
                let mut graph = setup_graph();
                push_all(&mut graph, &corpus, false);
                for (user, _) in corpus.iter() {
                    graph
                        .update(
                            Operation::AddToRelatedRecords {
                                record: user.clone(),
                                field: "pets".to_string(),
                                value: vec![cache.create_identifier("pet")],
                                index: None,
                            },
                            false,
                        )
                        .unwrap();
                }
                graph
            },
            |mut graph| {
                push_all(&mut graph, &corpus, true);
                graph
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_bulk_remote_replace,
    bench_resync_with_local_intent
);
criterion_main!(benches);

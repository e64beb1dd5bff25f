//! Property tree benchmarks.
//!
//! Measures the editor paths that run on every frame of an open inspector
//! (validation, multi-instance reads) and on every commit (a write that
//! propagates to many derived instances).
//!
//! Run with: `cargo bench --bench tree_benchmarks`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use proptree_editor::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Scene {
    store: InstanceStore,
    metadata: Arc<MetadataRegistry>,
    actor: TypeKey,
}

/// A schema with one struct-heavy object type: a transform struct, an
/// array of waypoints, and a handful of scalars.
fn scene() -> Scene {
    let mut b = SchemaBuilder::new();
    let vec3 = b
        .structure("Vec3")
        .field("X", FieldSpec::Float)
        .field("Y", FieldSpec::Float)
        .field("Z", FieldSpec::Float)
        .finish()
        .unwrap();
    let actor = b
        .object("Actor", None)
        .field("Location", FieldSpec::Struct(vec3))
        .meta(keys::CATEGORY, "Transform")
        .field("Scale", FieldSpec::Struct(vec3))
        .meta(keys::CATEGORY, "Transform")
        .field("Waypoints", FieldSpec::array(FieldSpec::Struct(vec3)))
        .meta(keys::CATEGORY, "Path")
        .field("Speed", FieldSpec::Float)
        .meta(keys::CLAMP_MIN, "0")
        .field("Hidden", FieldSpec::Bool)
        .field("Label", FieldSpec::Str)
        .finish()
        .unwrap();
    let (schema, metadata) = b.build();
    Scene {
        store: InstanceStore::new(Arc::new(schema)),
        metadata: Arc::new(metadata),
        actor,
    }
}

/// Spawn `count` plain actors, each with `waypoints` waypoints.
fn spawn_actors(s: &mut Scene, count: usize, waypoints: usize) -> Vec<InstanceId> {
    let ids: Vec<InstanceId> = (0..count)
        .map(|i| s.store.spawn(s.actor, &format!("Actor{i}")).unwrap())
        .collect();
    let mut tree = PropertyTree::for_instances(&s.store, &ids, s.metadata.clone(), TreeConfig::default());
    let node = tree.find_by_path("Waypoints", &s.store).unwrap();
    for _ in 0..waypoints {
        tree.add_item(node, &mut s.store).unwrap();
    }
    ids
}

// ---------------------------------------------------------------------------
// Benchmark 1: build, expand, and validate a tree
// ---------------------------------------------------------------------------

fn bench_build_and_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_expand_validate");

    for &waypoints in &[8usize, 64, 256] {
        let mut s = scene();
        let ids = spawn_actors(&mut s, 1, waypoints);

        group.bench_with_input(BenchmarkId::from_parameter(waypoints), &waypoints, |b, _| {
            b.iter(|| {
                let mut tree =
                    PropertyTree::for_instances(&s.store, &ids, s.metadata.clone(), TreeConfig::default());
                let root = tree.root();
                tree.expand_all(root, &s.store);
                black_box(tree.ensure_data_is_valid(&s.store));
                black_box(tree.len());
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark 2: steady-state validation of an expanded tree
// ---------------------------------------------------------------------------

fn bench_steady_validation(c: &mut Criterion) {
    let mut s = scene();
    let ids = spawn_actors(&mut s, 1, 128);
    let mut tree = PropertyTree::for_instances(&s.store, &ids, s.metadata.clone(), TreeConfig::default());
    let root = tree.root();
    tree.expand_all(root, &s.store);
    tree.ensure_data_is_valid(&s.store);

    c.bench_function("validate_expanded_128_waypoints", |b| {
        b.iter(|| black_box(tree.ensure_data_is_valid(&s.store)));
    });
}

// ---------------------------------------------------------------------------
// Benchmark 3: multi-instance reads
// ---------------------------------------------------------------------------

fn bench_multi_instance_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_instance_value_as_text");

    for &count in &[1usize, 16, 128] {
        let mut s = scene();
        let ids = spawn_actors(&mut s, count, 0);
        let mut tree = PropertyTree::for_instances(&s.store, &ids, s.metadata.clone(), TreeConfig::default());
        let node = tree.find_by_path("Location.X", &s.store).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                black_box(tree.value_as_text(node, &s.store).unwrap());
                black_box(tree.differs_from_default(node, &s.store));
                tree.invalidate_diff_caches();
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark 4: archetype edit propagating to derived instances
// ---------------------------------------------------------------------------

fn bench_propagating_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagating_write");

    for &derived in &[10usize, 100, 1000] {
        let mut s = scene();
        let proto = s.store.spawn_template(s.actor, "Proto").unwrap();
        for i in 0..derived {
            s.store.spawn_derived(proto, &format!("Derived{i}")).unwrap();
        }
        let mut tree = PropertyTree::for_instances(&s.store, &[proto], s.metadata.clone(), TreeConfig::default());
        let speed = tree.find_by_path("Speed", &s.store).unwrap();
        let mut value = 0.0;

        group.bench_with_input(BenchmarkId::from_parameter(derived), &derived, |b, _| {
            b.iter(|| {
                value += 1.0;
                tree.set_float(speed, value, &mut s.store).unwrap();
                tree.journal_mut().clear();
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark 5: container edits with child rebuilds
// ---------------------------------------------------------------------------

fn bench_container_churn(c: &mut Criterion) {
    let mut s = scene();
    let ids = spawn_actors(&mut s, 1, 64);
    let mut tree = PropertyTree::for_instances(&s.store, &ids, s.metadata.clone(), TreeConfig::default());
    let waypoints = tree.find_by_path("Waypoints", &s.store).unwrap();
    tree.set_expanded(waypoints, true, &s.store);

    c.bench_function("insert_delete_64_waypoints", |b| {
        b.iter(|| {
            tree.insert_item(waypoints, 32, &mut s.store).unwrap();
            tree.delete_item(waypoints, 32, &mut s.store).unwrap();
            tree.journal_mut().clear();
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_build_and_validate,
    bench_steady_validation,
    bench_multi_instance_read,
    bench_propagating_write,
    bench_container_churn,
);
criterion_main!(benches);

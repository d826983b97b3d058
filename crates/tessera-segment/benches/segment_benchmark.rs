//! Benchmarks for the growing-segment write and read paths.
//!
//! Run with: `cargo bench --bench segment_benchmark`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use tessera_segment::{
    DataType, FieldBatch, FieldId, FieldSchema, GrowingSegment, IndexRegistry, MetricType,
    PrimaryKey, QueryVectors, Schema, SearchRequest, SegmentConfig, MAX_TIMESTAMP, NO_ROUNDING,
};

const PK: FieldId = FieldId(100);
const VEC: FieldId = FieldId(101);
const DIM: usize = 128;

fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::new(vec![
            FieldSchema::scalar(PK, "id", DataType::Int64).primary(),
            FieldSchema::vector(VEC, "embedding", DataType::FloatVector, DIM),
        ])
        .unwrap(),
    )
}

fn generate_vector(seed: u64) -> Vec<f32> {
    let mut v = Vec::with_capacity(DIM);
    let mut x = seed.wrapping_add(1);
    for _ in 0..DIM {
        x = x.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        v.push((x as f32 / u64::MAX as f32) * 2.0 - 1.0);
    }
    v
}

fn insert_rows(segment: &GrowingSegment, start_id: i64, rows: usize) {
    let base = segment.reserve_insert(rows);
    let row_ids: Vec<i64> = (start_id..start_id + rows as i64).collect();
    let timestamps: Vec<u64> = row_ids.iter().map(|&id| id as u64 + 1).collect();
    let mut data = Vec::with_capacity(rows * DIM);
    for &id in &row_ids {
        data.extend_from_slice(&generate_vector(id as u64));
    }
    segment.insert(
        base,
        &row_ids,
        &timestamps,
        vec![
            (PK, FieldBatch::Int64(row_ids.clone())),
            (VEC, FieldBatch::FloatVector { dim: DIM, data }),
        ],
    );
}

fn populated_segment(rows: usize) -> GrowingSegment {
    let segment = GrowingSegment::new(
        schema(),
        SegmentConfig::default(),
        IndexRegistry::with_defaults(),
    );
    insert_rows(&segment, 0, rows);
    segment
}

fn bench_insert(c: &mut Criterion) {
    c.bench_function("insert_1k_rows_128d", |b| {
        b.iter_batched(
            || {
                GrowingSegment::new(
                    schema(),
                    SegmentConfig::default(),
                    IndexRegistry::with_defaults(),
                )
            },
            |segment| {
                insert_rows(&segment, 0, 1_000);
                black_box(segment.row_count())
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_search(c: &mut Criterion) {
    let segment = populated_segment(10_000);
    let request = SearchRequest {
        field_id: VEC,
        queries: QueryVectors::Float {
            dim: DIM,
            data: generate_vector(42),
        },
        metric: MetricType::L2,
        topk: 10,
        round_decimal: NO_ROUNDING,
    };

    c.bench_function("search_10k_rows_128d_top10", |b| {
        b.iter(|| black_box(segment.search(&request, MAX_TIMESTAMP).unwrap()));
    });

    // A barrier in the middle of the segment exercises the partial-chunk
    // masking path.
    c.bench_function("search_10k_rows_128d_top10_half_visible", |b| {
        b.iter(|| black_box(segment.search(&request, 5_000).unwrap()));
    });
}

fn bench_search_with_deletes(c: &mut Criterion) {
    let segment = populated_segment(10_000);
    let pks: Vec<PrimaryKey> = (0..1_000).map(|id| PrimaryKey::Int64(id * 10)).collect();
    let timestamps: Vec<u64> = (0..1_000).map(|i| 20_000 + i).collect();
    let base = segment.reserve_delete(pks.len());
    segment.delete(base, &pks, &timestamps);

    let request = SearchRequest {
        field_id: VEC,
        queries: QueryVectors::Float {
            dim: DIM,
            data: generate_vector(42),
        },
        metric: MetricType::L2,
        topk: 10,
        round_decimal: NO_ROUNDING,
    };

    c.bench_function("search_10k_rows_10pct_deleted", |b| {
        b.iter(|| black_box(segment.search(&request, MAX_TIMESTAMP).unwrap()));
    });
}

fn bench_pk_lookup(c: &mut Criterion) {
    let segment = populated_segment(100_000);

    c.bench_function("pk_offsets_100k_rows", |b| {
        let mut id = 0;
        b.iter(|| {
            id = (id + 7) % 100_000;
            black_box(segment.pk_offsets(&PrimaryKey::Int64(id), MAX_TIMESTAMP))
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_search,
    bench_search_with_deletes,
    bench_pk_lookup
);
criterion_main!(benches);

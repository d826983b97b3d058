//! Tests for the growing segment write path and its timestamped reads.

use std::sync::Arc;

use crate::column::FieldBatch;
use crate::config::SegmentConfig;
use crate::index::IndexRegistry;
use crate::metric::MetricType;
use crate::schema::{
    DataType, FieldId, FieldSchema, PrimaryKey, Schema, Timestamp, MAX_TIMESTAMP,
};
use crate::search::NO_ROUNDING;
use crate::segment::{AllRows, QueryVectors, RetrieveRequest, SearchRequest};

use super::GrowingSegment;

const PK: FieldId = FieldId(100);
const VEC: FieldId = FieldId(101);

fn small_config() -> SegmentConfig {
    let mut config = SegmentConfig::default();
    config.column.chunk_rows = 64;
    config
}

fn segment_with(config: SegmentConfig) -> GrowingSegment {
    let schema = Schema::new(vec![
        FieldSchema::scalar(PK, "id", DataType::Int64).primary(),
        FieldSchema::vector(VEC, "embedding", DataType::FloatVector, 2),
    ])
    .unwrap();
    GrowingSegment::new(Arc::new(schema), config, IndexRegistry::with_defaults())
}

fn segment() -> GrowingSegment {
    segment_with(small_config())
}

/// Inserts `rows` rows with ids `start_id..`, timestamps `start_ts..` and
/// vectors `[id, 0]`.
fn insert_rows(segment: &GrowingSegment, start_id: i64, rows: usize, start_ts: Timestamp) {
    let base = segment.reserve_insert(rows);
    let row_ids: Vec<i64> = (start_id..start_id + rows as i64).collect();
    let timestamps: Vec<Timestamp> = (start_ts..start_ts + rows as u64).collect();
    let mut data = Vec::with_capacity(rows * 2);
    for &id in &row_ids {
        data.push(id as f32);
        data.push(0.0);
    }
    segment.insert(
        base,
        &row_ids,
        &timestamps,
        vec![
            (PK, FieldBatch::Int64(row_ids.clone())),
            (VEC, FieldBatch::FloatVector { dim: 2, data }),
        ],
    );
}

fn delete_pks(segment: &GrowingSegment, ids: &[i64], ts: Timestamp) {
    let pks: Vec<PrimaryKey> = ids.iter().map(|&id| PrimaryKey::Int64(id)).collect();
    let timestamps = vec![ts; ids.len()];
    let base = segment.reserve_delete(ids.len());
    segment.delete(base, &pks, &timestamps);
}

fn l2_request(query: [f32; 2], topk: usize) -> SearchRequest {
    SearchRequest {
        field_id: VEC,
        queries: QueryVectors::Float {
            dim: 2,
            data: query.to_vec(),
        },
        metric: MetricType::L2,
        topk,
        round_decimal: NO_ROUNDING,
    }
}

#[test]
fn insert_advances_watermark_and_counts() {
    // Arrange
    let segment = segment();

    // Act
    insert_rows(&segment, 0, 10, 100);

    // Assert
    assert_eq!(segment.row_count(), 10);
    assert_eq!(segment.active_count(99), 0);
    assert_eq!(segment.active_count(104), 5);
    assert_eq!(segment.active_count(MAX_TIMESTAMP), 10);
}

#[test]
fn unsorted_batch_is_sorted_by_timestamp() {
    // Arrange
    let segment = segment();
    let base = segment.reserve_insert(3);

    // Act: commit timestamps out of order within the batch.
    segment.insert(
        base,
        &[30, 10, 20],
        &[30, 10, 20],
        vec![
            (PK, FieldBatch::Int64(vec![30, 10, 20])),
            (
                VEC,
                FieldBatch::FloatVector {
                    dim: 2,
                    data: vec![30.0, 0.0, 10.0, 0.0, 20.0, 0.0],
                },
            ),
        ],
    );

    // Assert: the committed window is ordered, so the binary search works.
    assert_eq!(segment.active_count(10), 1);
    assert_eq!(segment.active_count(20), 2);
    assert_eq!(segment.insert_record().timestamps().value(0), 10);
    assert_eq!(segment.pk_offsets(&PrimaryKey::Int64(30), MAX_TIMESTAMP), [2]);
}

#[test]
fn search_returns_nearest_rows() {
    // Arrange
    let segment = segment();
    insert_rows(&segment, 0, 20, 0);

    // Act
    let result = segment.search(&l2_request([0.0, 0.0], 3), MAX_TIMESTAMP).unwrap();

    // Assert
    assert_eq!(result.query_offsets(0), [Some(0), Some(1), Some(2)]);
    assert_eq!(
        result.query_primary_keys(0)[0],
        Some(PrimaryKey::Int64(0))
    );
    assert!((result.query_scores(0)[1] - 1.0).abs() < 1e-6);
}

#[test]
fn search_respects_query_timestamp() {
    // Arrange
    let segment = segment();
    insert_rows(&segment, 0, 20, 0);

    // Act: only rows committed at ts <= 4 are candidates.
    let result = segment.search(&l2_request([19.0, 0.0], 3), 4).unwrap();

    // Assert: best visible row is id 4.
    assert_eq!(result.query_offsets(0)[0], Some(4));

    // A timestamp before every commit sees nothing.
    let empty = segment.search(&l2_request([0.0, 0.0], 3), 0).unwrap();
    assert!(empty.query_offsets(0).iter().all(Option::is_none));
}

#[test]
fn deleted_rows_vanish_from_search() {
    // Arrange
    let segment = segment();
    insert_rows(&segment, 0, 10, 0);
    delete_pks(&segment, &[0, 1], 100);

    // Act
    let result = segment.search(&l2_request([0.0, 0.0], 3), MAX_TIMESTAMP).unwrap();

    // Assert
    assert_eq!(result.query_offsets(0), [Some(2), Some(3), Some(4)]);

    // Before the delete's timestamp the rows are still visible.
    let earlier = segment.search(&l2_request([0.0, 0.0], 3), 99).unwrap();
    assert_eq!(earlier.query_offsets(0)[0], Some(0));
}

#[test]
fn delete_wins_a_timestamp_tie() {
    // Arrange: insert and delete share ts 5.
    let segment = segment();
    insert_rows(&segment, 0, 1, 5);
    delete_pks(&segment, &[0], 5);

    // Assert: invisible at the shared timestamp.
    assert!(segment.pk_offsets(&PrimaryKey::Int64(0), 5).is_empty());
}

#[test]
fn reinsert_after_delete_survives() {
    // Arrange: id 7 lives at ts 10, dies at ts 20, returns at ts 30.
    let segment = segment();
    insert_rows(&segment, 7, 1, 10);
    delete_pks(&segment, &[7], 20);
    insert_rows(&segment, 7, 1, 30);

    // Assert: only the second incarnation is visible afterwards.
    assert_eq!(segment.pk_offsets(&PrimaryKey::Int64(7), 15), [0]);
    assert!(segment.pk_offsets(&PrimaryKey::Int64(7), 25).is_empty());
    assert_eq!(segment.pk_offsets(&PrimaryKey::Int64(7), 35), [1]);
}

#[test]
fn retrieve_scans_in_offset_order_with_limit() {
    // Arrange
    let segment = segment();
    insert_rows(&segment, 0, 10, 0);
    delete_pks(&segment, &[2], 50);

    // Act
    let result = segment
        .retrieve(
            &RetrieveRequest {
                field_ids: vec![PK],
                limit: Some(4),
            },
            &AllRows,
            MAX_TIMESTAMP,
        )
        .unwrap();

    // Assert: offset 2 is masked out, limit applies after masking.
    assert_eq!(result.offsets, [0, 1, 3, 4]);
    assert_eq!(result.row_ids, [0, 1, 3, 4]);
    match &result.fields[0].1 {
        FieldBatch::Int64(v) => assert_eq!(v, &[0, 1, 3, 4]),
        other => panic!("unexpected batch {other:?}"),
    }
}

#[test]
fn search_spans_chunk_boundaries() {
    // Arrange: 3 chunks of 64 plus a tail.
    let segment = segment();
    insert_rows(&segment, 0, 200, 0);

    // Act: nearest to id 150 lives in the third chunk.
    let result = segment.search(&l2_request([150.0, 0.0], 2), MAX_TIMESTAMP).unwrap();

    // Assert
    assert_eq!(result.query_offsets(0)[0], Some(150));
}

#[test]
fn chunk_indexes_answer_like_the_scan() {
    // Arrange: same data in an indexed and a plain segment.
    let mut indexed_config = small_config();
    indexed_config.growing_index.enabled = true;
    let indexed = segment_with(indexed_config);
    let plain = segment();
    insert_rows(&indexed, 0, 200, 0);
    insert_rows(&plain, 0, 200, 0);

    // Act
    let request = l2_request([77.3, 0.0], 5);
    let from_index = indexed.search(&request, MAX_TIMESTAMP).unwrap();
    let from_scan = plain.search(&request, MAX_TIMESTAMP).unwrap();

    // Assert
    assert_eq!(from_index.offsets, from_scan.offsets);
    assert_eq!(from_index.scores, from_scan.scores);
}

#[test]
fn rounding_truncates_scores_once() {
    // Arrange
    let segment = segment();
    let base = segment.reserve_insert(1);
    segment.insert(
        base,
        &[0],
        &[0],
        vec![
            (PK, FieldBatch::Int64(vec![0])),
            (
                VEC,
                FieldBatch::FloatVector {
                    dim: 2,
                    data: vec![0.123_456, 0.0],
                },
            ),
        ],
    );
    let mut request = l2_request([0.0, 0.0], 1);
    request.round_decimal = 3;

    // Act
    let result = segment.search(&request, MAX_TIMESTAMP).unwrap();

    // Assert: 0.123456^2 = 0.015241..., rounded to 0.015.
    assert!((result.query_scores(0)[0] - 0.015).abs() < 1e-7);
}

#[test]
fn out_of_order_commits_hold_the_watermark() {
    // Arrange: two windows reserved in order.
    let segment = segment();
    let first = segment.reserve_insert(100);
    let second = segment.reserve_insert(50);
    assert_eq!((first, second), (0, 100));

    let commit = |base: usize, rows: usize| {
        let row_ids: Vec<i64> = (base as i64..(base + rows) as i64).collect();
        let timestamps: Vec<u64> = (base as u64..(base + rows) as u64).collect();
        let data = vec![0.0f32; rows * 2];
        segment.insert(
            base,
            &row_ids,
            &timestamps,
            vec![
                (PK, FieldBatch::Int64(row_ids.clone())),
                (VEC, FieldBatch::FloatVector { dim: 2, data }),
            ],
        );
    };

    // Act: commit the later window first.
    commit(second, 50);
    assert_eq!(segment.row_count(), 0);

    commit(first, 100);

    // Assert: the watermark jumps over both windows at once.
    assert_eq!(segment.row_count(), 150);
}

#[test]
fn search_rejects_wrong_field_and_dimension() {
    let segment = segment();
    insert_rows(&segment, 0, 4, 0);

    let scalar_target = SearchRequest {
        field_id: PK,
        ..l2_request([0.0, 0.0], 1)
    };
    assert!(segment.search(&scalar_target, MAX_TIMESTAMP).is_err());

    let wrong_dim = SearchRequest {
        queries: QueryVectors::Float {
            dim: 3,
            data: vec![0.0; 3],
        },
        ..l2_request([0.0, 0.0], 1)
    };
    assert!(segment.search(&wrong_dim, MAX_TIMESTAMP).is_err());
}

#[test]
#[should_panic(expected = "ragged insert batch")]
fn ragged_insert_batch_panics() {
    let segment = segment();
    let base = segment.reserve_insert(2);
    segment.insert(base, &[0, 1], &[0], Vec::new());
}

#[test]
#[should_panic(expected = "cover every schema field")]
fn incomplete_batch_panics() {
    let segment = segment();
    let base = segment.reserve_insert(1);
    segment.insert(base, &[0], &[0], vec![(PK, FieldBatch::Int64(vec![0]))]);
}

#[test]
fn memory_usage_grows_with_inserts() {
    let segment = segment();
    let before = segment.memory_usage_bytes();
    insert_rows(&segment, 0, 100, 0);
    assert!(segment.memory_usage_bytes() > before);
}

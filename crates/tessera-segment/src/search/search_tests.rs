//! Tests for per-segment result blocks and their merging.

use crate::index::IndexHits;
use crate::metric::MetricType;
use crate::schema::PrimaryKey;
use crate::search::{SearchResult, SubSearchResult, NO_ROUNDING};

fn hits(num_queries: usize, topk: usize, labels: Vec<Option<usize>>, scores: Vec<f32>) -> IndexHits {
    IndexHits {
        num_queries,
        topk,
        labels,
        scores,
    }
}

#[test]
fn empty_block_loses_every_slot() {
    // Arrange & Act
    let block = SubSearchResult::new(2, 3, MetricType::L2, NO_ROUNDING);

    // Assert
    assert_eq!(block.num_queries(), 2);
    assert_eq!(block.topk(), 3);
    assert!(block.query_offsets(0).iter().all(Option::is_none));
    assert!(block.query_scores(1).iter().all(|s| *s == f32::MAX));
}

#[test]
fn labels_translate_by_base_offset() {
    // Arrange
    let h = hits(1, 3, vec![Some(2), Some(0), None], vec![0.1, 0.4, f32::MAX]);

    // Act
    let block = SubSearchResult::from_hits(h, MetricType::L2, NO_ROUNDING, 1000);

    // Assert
    assert_eq!(block.query_offsets(0), [Some(1002), Some(1000), None]);
    assert_eq!(block.query_scores(0), [0.1, 0.4, f32::MAX]);
}

#[test]
fn absorb_merges_best_first_for_l2() {
    // Arrange: two chunks of the same query, each sorted ascending.
    let mut left = SubSearchResult::from_hits(
        hits(1, 3, vec![Some(0), Some(1), Some(2)], vec![0.1, 0.5, 0.9]),
        MetricType::L2,
        NO_ROUNDING,
        0,
    );
    let right = SubSearchResult::from_hits(
        hits(1, 3, vec![Some(0), Some(1), Some(2)], vec![0.2, 0.3, 2.0]),
        MetricType::L2,
        NO_ROUNDING,
        100,
    );

    // Act
    left.absorb(&right);

    // Assert: global best three across both chunks.
    assert_eq!(left.query_offsets(0), [Some(0), Some(100), Some(101)]);
    assert_eq!(left.query_scores(0), [0.1, 0.2, 0.3]);
}

#[test]
fn absorb_merges_best_first_for_ip() {
    // Arrange: inner product ranks descending.
    let mut left = SubSearchResult::from_hits(
        hits(1, 2, vec![Some(0), Some(1)], vec![0.9, 0.2]),
        MetricType::Ip,
        NO_ROUNDING,
        0,
    );
    let right = SubSearchResult::from_hits(
        hits(1, 2, vec![Some(0), Some(1)], vec![0.8, 0.5]),
        MetricType::Ip,
        NO_ROUNDING,
        10,
    );

    // Act
    left.absorb(&right);

    // Assert
    assert_eq!(left.query_offsets(0), [Some(0), Some(10)]);
    assert_eq!(left.query_scores(0), [0.9, 0.8]);
}

#[test]
fn absorb_of_empty_block_is_identity() {
    // Arrange
    let mut block = SubSearchResult::from_hits(
        hits(1, 2, vec![Some(3), None], vec![0.4, f32::MAX]),
        MetricType::L2,
        NO_ROUNDING,
        0,
    );
    let empty = SubSearchResult::new(1, 2, MetricType::L2, NO_ROUNDING);

    // Act
    block.absorb(&empty);

    // Assert
    assert_eq!(block.query_offsets(0), [Some(3), None]);
    assert_eq!(block.query_scores(0), [0.4, f32::MAX]);
}

#[test]
fn absorb_keeps_queries_separate() {
    // Arrange: two queries with different winners per side.
    let mut left = SubSearchResult::from_hits(
        hits(
            2,
            2,
            vec![Some(0), None, Some(1), None],
            vec![0.5, f32::MAX, 0.1, f32::MAX],
        ),
        MetricType::L2,
        NO_ROUNDING,
        0,
    );
    let right = SubSearchResult::from_hits(
        hits(
            2,
            2,
            vec![Some(0), None, Some(1), None],
            vec![0.2, f32::MAX, 0.7, f32::MAX],
        ),
        MetricType::L2,
        NO_ROUNDING,
        100,
    );

    // Act
    left.absorb(&right);

    // Assert
    assert_eq!(left.query_offsets(0), [Some(100), Some(0)]);
    assert_eq!(left.query_offsets(1), [Some(1), Some(101)]);
}

#[test]
#[should_panic(expected = "topk mismatch")]
fn absorb_rejects_mismatched_shapes() {
    let mut left = SubSearchResult::new(1, 3, MetricType::L2, NO_ROUNDING);
    let right = SubSearchResult::new(1, 4, MetricType::L2, NO_ROUNDING);
    left.absorb(&right);
}

#[test]
fn round_scores_truncates_filled_slots_only() {
    // Arrange
    let mut block = SubSearchResult::from_hits(
        hits(1, 3, vec![Some(0), Some(1), None], vec![0.12345, 0.6789, f32::MAX]),
        MetricType::L2,
        2,
        0,
    );

    // Act
    block.round_scores();

    // Assert: two digits kept, the empty slot still carries the sentinel.
    assert_eq!(block.query_scores(0), [0.12, 0.68, f32::MAX]);
}

#[test]
fn rounding_disabled_leaves_scores_alone() {
    // Arrange
    let mut block = SubSearchResult::from_hits(
        hits(1, 1, vec![Some(0)], vec![0.123_456_8]),
        MetricType::L2,
        NO_ROUNDING,
        0,
    );

    // Act
    block.round_scores();

    // Assert
    assert_eq!(block.query_scores(0), [0.123_456_8]);
}

#[test]
fn search_result_pairs_keys_with_slots() {
    // Arrange
    let block = SubSearchResult::from_hits(
        hits(1, 2, vec![Some(5), None], vec![0.3, f32::MAX]),
        MetricType::L2,
        NO_ROUNDING,
        0,
    );
    let pks = vec![Some(PrimaryKey::from(42)), None];

    // Act
    let result = SearchResult::new(block, pks);

    // Assert
    assert_eq!(result.query_offsets(0), [Some(5), None]);
    assert_eq!(
        result.query_primary_keys(0),
        [Some(PrimaryKey::from(42)), None]
    );
}

#[test]
#[should_panic(expected = "wrong shape")]
fn search_result_rejects_short_key_block() {
    let block = SubSearchResult::new(1, 2, MetricType::L2, NO_ROUNDING);
    let _ = SearchResult::new(block, vec![None]);
}

#[test]
fn repeated_absorb_matches_a_full_sort() {
    // Arrange: three chunks, scores interleaved.
    let chunks = [
        (vec![0.7f32, 0.8], 0usize),
        (vec![0.1, 0.9], 10),
        (vec![0.2, 0.3], 20),
    ];
    let mut acc = SubSearchResult::new(1, 4, MetricType::L2, NO_ROUNDING);

    // Act: kernels pad short chunks up to the request topk themselves.
    for (scores, base) in &chunks {
        let mut padded_scores = scores.clone();
        padded_scores.extend([f32::MAX, f32::MAX]);
        let block = SubSearchResult::from_hits(
            hits(1, 4, vec![Some(0), Some(1), None, None], padded_scores),
            MetricType::L2,
            NO_ROUNDING,
            *base,
        );
        acc.absorb(&block);
    }

    // Assert: best four of the six candidates, ascending.
    assert_eq!(acc.query_scores(0), [0.1, 0.2, 0.3, 0.7]);
    assert_eq!(acc.query_offsets(0), [Some(10), Some(20), Some(21), Some(0)]);
}

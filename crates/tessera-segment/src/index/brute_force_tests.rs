//! Tests for the exact-scan kernel.

use roaring::RoaringBitmap;

use super::*;
use crate::error::Error;
use crate::metric::MetricType;

fn unit_corpus() -> Vec<f32> {
    // Rows 0..5 along one axis: distances from the origin query grow with
    // the row number.
    vec![
        0.0, 0.0, //
        1.0, 0.0, //
        2.0, 0.0, //
        3.0, 0.0, //
        4.0, 0.0, //
    ]
}

fn float_ref(data: &[f32]) -> VectorsRef<'_> {
    VectorsRef::Float { dim: 2, data }
}

#[test]
fn l2_returns_rows_in_ascending_distance() {
    let corpus = unit_corpus();
    let kernel = BruteForceKernel::build(MetricType::L2, float_ref(&corpus));
    let query = [0.0f32, 0.0];

    let hits = kernel.search(&float_ref(&query), 3, None).unwrap();

    assert_eq!(hits.num_queries, 1);
    assert_eq!(hits.labels[..3], [Some(0), Some(1), Some(2)]);
    assert!(hits.scores[0] <= hits.scores[1] && hits.scores[1] <= hits.scores[2]);
}

#[test]
fn ip_returns_rows_in_descending_score() {
    let corpus = unit_corpus();
    let kernel = BruteForceKernel::build(MetricType::Ip, float_ref(&corpus));
    let query = [1.0f32, 0.0];

    let hits = kernel.search(&float_ref(&query), 3, None).unwrap();

    assert_eq!(hits.labels[..3], [Some(4), Some(3), Some(2)]);
    assert!(hits.scores[0] >= hits.scores[1] && hits.scores[1] >= hits.scores[2]);
}

#[test]
fn filter_excludes_masked_rows() {
    let corpus = unit_corpus();
    let kernel = BruteForceKernel::build(MetricType::L2, float_ref(&corpus));
    let query = [0.0f32, 0.0];

    let mut filter = RoaringBitmap::new();
    filter.insert(0);
    filter.insert(1);

    let hits = kernel.search(&float_ref(&query), 3, Some(&filter)).unwrap();
    assert_eq!(hits.labels[..3], [Some(2), Some(3), Some(4)]);
}

#[test]
fn short_corpus_pads_with_empty_slots() {
    let corpus = vec![0.0f32, 0.0, 1.0, 0.0];
    let kernel = BruteForceKernel::build(MetricType::L2, float_ref(&corpus));
    let query = [0.0f32, 0.0];

    let hits = kernel.search(&float_ref(&query), 4, None).unwrap();

    assert_eq!(hits.labels, vec![Some(0), Some(1), None, None]);
    assert_eq!(hits.scores[2], MetricType::L2.worst_score());
}

#[test]
fn multi_query_results_are_row_major() {
    let corpus = unit_corpus();
    let kernel = BruteForceKernel::build(MetricType::L2, float_ref(&corpus));
    let queries = [0.0f32, 0.0, 4.0, 0.0];

    let hits = kernel.search(&float_ref(&queries), 2, None).unwrap();

    assert_eq!(hits.num_queries, 2);
    assert_eq!(hits.labels[..2], [Some(0), Some(1)]);
    assert_eq!(hits.labels[2..], [Some(4), Some(3)]);
}

#[test]
fn hamming_search_over_binary_rows() {
    let corpus: Vec<u8> = vec![0b0000_0000, 0b1111_1111, 0b0000_1111];
    let block = VectorsRef::Binary {
        dim: 8,
        data: &corpus,
    };
    let kernel = BruteForceKernel::build(MetricType::Hamming, block);
    let query = [0b0000_0000u8];

    let hits = kernel
        .search(
            &VectorsRef::Binary {
                dim: 8,
                data: &query,
            },
            3,
            None,
        )
        .unwrap();

    assert_eq!(hits.labels, vec![Some(0), Some(2), Some(1)]);
    assert_eq!(hits.scores, vec![0.0, 4.0, 8.0]);
}

#[test]
fn invalid_requests_are_rejected() {
    let corpus = unit_corpus();
    let kernel = BruteForceKernel::build(MetricType::L2, float_ref(&corpus));
    let query = [0.0f32, 0.0];

    assert!(matches!(
        kernel.search(&float_ref(&query), 0, None),
        Err(Error::InvalidQuery(_))
    ));

    let narrow = [0.0f32];
    assert!(matches!(
        kernel.search(
            &VectorsRef::Float {
                dim: 1,
                data: &narrow
            },
            1,
            None
        ),
        Err(Error::DimensionMismatch { .. })
    ));

    let binary = [0u8];
    assert!(matches!(
        kernel.search(
            &VectorsRef::Binary {
                dim: 2,
                data: &binary
            },
            1,
            None
        ),
        Err(Error::DimensionMismatch { .. }) | Err(Error::InvalidQuery(_))
    ));
}

#[test]
fn serialize_then_load_preserves_results() {
    let corpus = unit_corpus();
    let kernel = BruteForceKernel::build(MetricType::L2, float_ref(&corpus));
    let blob = kernel.serialize().unwrap();

    let info = IndexLoadInfo {
        kind: BRUTE_FORCE_KIND.to_string(),
        metric: MetricType::L2,
        dim: 2,
        row_count: 5,
        params: serde_json::Value::Null,
        blob,
    };
    let loaded = BruteForceKernel::from_blob(&info).unwrap();

    let query = [2.1f32, 0.0];
    let a = kernel.search(&float_ref(&query), 2, None).unwrap();
    let b = loaded.search(&float_ref(&query), 2, None).unwrap();
    assert_eq!(a.labels, b.labels);
    assert_eq!(a.scores, b.scores);
}

#[test]
fn load_cross_checks_the_description() {
    let corpus = unit_corpus();
    let kernel = BruteForceKernel::build(MetricType::L2, float_ref(&corpus));
    let blob = kernel.serialize().unwrap();

    let wrong_rows = IndexLoadInfo {
        kind: BRUTE_FORCE_KIND.to_string(),
        metric: MetricType::L2,
        dim: 2,
        row_count: 99,
        params: serde_json::Value::Null,
        blob: blob.clone(),
    };
    assert!(matches!(
        BruteForceKernel::from_blob(&wrong_rows),
        Err(Error::RowCountMismatch {
            expected: 99,
            actual: 5
        })
    ));

    let wrong_dim = IndexLoadInfo {
        kind: BRUTE_FORCE_KIND.to_string(),
        metric: MetricType::L2,
        dim: 3,
        row_count: 5,
        params: serde_json::Value::Null,
        blob,
    };
    assert!(matches!(
        BruteForceKernel::from_blob(&wrong_dim),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn registry_builds_and_loads_by_kind() {
    let registry = IndexRegistry::with_defaults();
    let corpus = unit_corpus();

    let built = registry
        .build(BRUTE_FORCE_KIND, MetricType::L2, float_ref(&corpus))
        .unwrap();
    assert_eq!(built.row_count(), 5);

    let info = IndexLoadInfo {
        kind: BRUTE_FORCE_KIND.to_string(),
        metric: MetricType::L2,
        dim: 2,
        row_count: 5,
        params: serde_json::Value::Null,
        blob: built.serialize().unwrap(),
    };
    let loaded = registry.load(&info).unwrap();
    assert_eq!(loaded.kind(), BRUTE_FORCE_KIND);

    assert!(matches!(
        registry.build("hnsw", MetricType::L2, float_ref(&corpus)),
        Err(Error::UnknownIndexKind(_))
    ));
}

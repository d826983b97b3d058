//! Exact-scan kernel.
//!
//! Scores every non-filtered row against every query and keeps the best
//! `topk` through a bounded heap. Used as the raw-data fallback on sealed
//! segments, the tail scan on growing segments, and (by default) the
//! growing per-chunk index.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Error, Result};
use crate::metric::{score_binary, score_f32, MetricType};

use super::{IndexHits, IndexLoadInfo, VectorIndex, VectorsRef, BRUTE_FORCE_KIND};

/// Owned copy of the indexed block.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum VectorStore {
    Float { dim: usize, data: Vec<f32> },
    Binary { dim: usize, data: Vec<u8> },
}

impl VectorStore {
    const fn dim(&self) -> usize {
        match self {
            Self::Float { dim, .. } | Self::Binary { dim, .. } => *dim,
        }
    }

    fn row_count(&self) -> usize {
        match self {
            Self::Float { dim, data } => data.len() / dim,
            Self::Binary { dim, data } => data.len() / (dim / 8),
        }
    }

    fn bytes(&self) -> usize {
        match self {
            Self::Float { data, .. } => data.len() * 4,
            Self::Binary { data, .. } => data.len(),
        }
    }

    fn as_vectors(&self) -> VectorsRef<'_> {
        match self {
            Self::Float { dim, data } => VectorsRef::Float { dim: *dim, data },
            Self::Binary { dim, data } => VectorsRef::Binary { dim: *dim, data },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct KernelBlob {
    metric: MetricType,
    store: VectorStore,
}

/// Candidate with a direction-normalized rank: lower rank is always better,
/// so a max-heap keeps the current worst on top.
struct Candidate {
    rank: f32,
    score: f32,
    label: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.rank.total_cmp(&other.rank) == Ordering::Equal && self.label == other.label
    }
}
impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .total_cmp(&other.rank)
            .then_with(|| self.label.cmp(&other.label))
    }
}

/// The exact-scan kernel.
#[derive(Debug, Clone)]
pub struct BruteForceKernel {
    metric: MetricType,
    store: VectorStore,
}

impl BruteForceKernel {
    /// Copies a vector block into a searchable kernel.
    #[must_use]
    pub fn build(metric: MetricType, vectors: VectorsRef<'_>) -> Self {
        let store = match vectors {
            VectorsRef::Float { dim, data } => VectorStore::Float {
                dim,
                data: data.to_vec(),
            },
            VectorsRef::Binary { dim, data } => VectorStore::Binary {
                dim,
                data: data.to_vec(),
            },
        };
        Self { metric, store }
    }

    /// Reconstructs a kernel from a serialized blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] for undecodable blobs and
    /// [`Error::RowCountMismatch`] / [`Error::DimensionMismatch`] when the
    /// blob disagrees with the load description.
    pub fn from_blob(info: &IndexLoadInfo) -> Result<Self> {
        let decoded: KernelBlob = bincode::deserialize(&info.blob)?;
        if decoded.store.dim() != info.dim {
            return Err(Error::DimensionMismatch {
                expected: info.dim,
                actual: decoded.store.dim(),
            });
        }
        if decoded.store.row_count() != info.row_count {
            return Err(Error::RowCountMismatch {
                expected: info.row_count,
                actual: decoded.store.row_count(),
            });
        }
        Ok(Self {
            metric: decoded.metric,
            store: decoded.store,
        })
    }

}

fn rank_of(metric: MetricType, score: f32) -> f32 {
    if metric.higher_is_better() {
        -score
    } else {
        score
    }
}

fn scan_one(
    metric: MetricType,
    corpus: &VectorsRef<'_>,
    query_float: Option<&[f32]>,
    query_binary: Option<&[u8]>,
    topk: usize,
    filter: Option<&RoaringBitmap>,
) -> Vec<Candidate> {
    let rows = corpus.row_count();
    let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(topk + 1);
    for row in 0..rows {
        if filter.is_some_and(|f| f.contains(row as u32)) {
            continue;
        }
        let score = match corpus {
            VectorsRef::Float { dim, data } => {
                let q = query_float.expect("float query against float corpus");
                score_f32(metric, q, &data[row * dim..(row + 1) * dim])
            }
            VectorsRef::Binary { dim, data } => {
                let bytes = dim / 8;
                let q = query_binary.expect("binary query against binary corpus");
                score_binary(q, &data[row * bytes..(row + 1) * bytes])
            }
        };
        heap.push(Candidate {
            rank: rank_of(metric, score),
            score,
            label: row,
        });
        if heap.len() > topk {
            heap.pop();
        }
    }
    heap.into_sorted_vec()
}

/// Exact scan of a borrowed block. No index needed; this is what raw-data
/// fallbacks and tail scans run.
///
/// Labels in the returned hits are block-local row positions.
///
/// # Errors
///
/// Returns [`Error::InvalidQuery`] when `topk` is zero, the query kind does
/// not match the corpus kind, or the metric does not apply to the corpus,
/// and [`Error::DimensionMismatch`] when dimensions disagree.
pub fn scan_block(
    metric: MetricType,
    corpus: &VectorsRef<'_>,
    queries: &VectorsRef<'_>,
    topk: usize,
    filter: Option<&RoaringBitmap>,
) -> Result<IndexHits> {
    if topk == 0 {
        return Err(Error::InvalidQuery("topk must be positive".into()));
    }
    if queries.dim() != corpus.dim() {
        return Err(Error::DimensionMismatch {
            expected: corpus.dim(),
            actual: queries.dim(),
        });
    }
    let corpus_is_binary = matches!(corpus, VectorsRef::Binary { .. });
    if matches!(queries, VectorsRef::Binary { .. }) != corpus_is_binary {
        return Err(Error::InvalidQuery(
            "query vector kind does not match the stored vectors".into(),
        ));
    }
    if (metric == MetricType::Hamming) != corpus_is_binary {
        return Err(Error::InvalidQuery(format!(
            "metric {metric:?} does not apply to this vector kind"
        )));
    }

    let num_queries = queries.row_count();
    let mut hits = IndexHits::empty(num_queries, topk, metric);
    for q in 0..num_queries {
        let ordered = match queries {
            VectorsRef::Float { dim, data } => scan_one(
                metric,
                corpus,
                Some(&data[q * dim..(q + 1) * dim]),
                None,
                topk,
                filter,
            ),
            VectorsRef::Binary { dim, data } => {
                let bytes = dim / 8;
                scan_one(
                    metric,
                    corpus,
                    None,
                    Some(&data[q * bytes..(q + 1) * bytes]),
                    topk,
                    filter,
                )
            }
        };
        for (slot, candidate) in ordered.into_iter().enumerate() {
            hits.labels[q * topk + slot] = Some(candidate.label);
            hits.scores[q * topk + slot] = candidate.score;
        }
    }
    Ok(hits)
}

impl VectorIndex for BruteForceKernel {
    fn kind(&self) -> &str {
        BRUTE_FORCE_KIND
    }

    fn metric(&self) -> MetricType {
        self.metric
    }

    fn row_count(&self) -> usize {
        self.store.row_count()
    }

    fn search(
        &self,
        queries: &VectorsRef<'_>,
        topk: usize,
        filter: Option<&RoaringBitmap>,
    ) -> Result<IndexHits> {
        scan_block(self.metric, &self.store.as_vectors(), queries, topk, filter)
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let blob = KernelBlob {
            metric: self.metric,
            store: self.store.clone(),
        };
        Ok(bincode::serialize(&blob)?)
    }

    fn memory_bytes(&self) -> usize {
        self.store.bytes()
    }
}

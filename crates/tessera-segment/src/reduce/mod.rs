//! Cross-segment search-result reduction.
//!
//! Every segment answers a search with its own best-first top-K block. The
//! reducer merges those blocks into the global top-K per query: a k-way
//! merge over one cursor per segment, seeded into a heap ordered by the
//! metric's direction, with primary-key deduplication (the same logical row
//! may surface from several segment snapshots). Stability is deterministic:
//! score ties break on the segment's position in the input.
//!
//! [`marshal_reduced`] is the boundary format: the reduced answer split into
//! caller-requested query slices, one serialized blob each.


use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Error, Result};
use crate::metric::MetricType;
use crate::schema::PrimaryKey;
use crate::search::SearchResult;

/// One globally merged hit: identity, score and where it lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedHit {
    /// External identity of the row.
    pub primary_key: PrimaryKey,
    /// Score under the result's metric, already rounded by the producer.
    pub score: f32,
    /// Position of the producing segment in the reduce input.
    pub source: usize,
    /// Row offset within the producing segment.
    pub offset: usize,
}

/// Global top-K answer: per query, at most `topk` deduplicated hits,
/// best-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducedResult {
    /// Queries answered.
    pub num_queries: usize,
    /// Requested output size per query; `queries[q].len() <= topk`.
    pub topk: usize,
    /// Metric the scores are under.
    pub metric: MetricType,
    /// Merged hits, one list per query.
    pub queries: Vec<Vec<ReducedHit>>,
}

impl ReducedResult {
    /// Decodes a blob produced by [`marshal_reduced`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] for undecodable blobs.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(blob)?)
    }
}

/// Cursor into one segment's slots for one query.
///
/// Walks the query's best-first window `[offset, right_bound)`; the empty
/// tail of a window (slots with no hit) counts as exhaustion, since empties
/// never precede real hits.
#[derive(Debug)]
pub struct SearchResultPair<'a> {
    result: &'a SearchResult,
    /// Position of the segment in the reduce input.
    pub source: usize,
    offset: usize,
    right_bound: usize,
}

impl<'a> SearchResultPair<'a> {
    /// Positions a cursor at the head of one query's window.
    #[must_use]
    pub fn new(result: &'a SearchResult, source: usize, query: usize) -> Self {
        let offset = query * result.topk;
        Self {
            result,
            source,
            offset,
            right_bound: offset + result.topk,
        }
    }

    /// The cursor's current primary key, `None` once exhausted.
    #[must_use]
    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        if self.offset < self.right_bound {
            self.result.primary_keys[self.offset].as_ref()
        } else {
            None
        }
    }

    /// The cursor's current score; the metric's worst once exhausted, so a
    /// spent cursor can never displace a real hit.
    #[must_use]
    pub fn score(&self) -> f32 {
        if self.primary_key().is_some() {
            self.result.scores[self.offset]
        } else {
            self.result.metric.worst_score()
        }
    }

    /// Row offset of the current hit within its segment.
    #[must_use]
    pub fn row_offset(&self) -> Option<usize> {
        if self.offset < self.right_bound {
            self.result.offsets[self.offset]
        } else {
            None
        }
    }

    /// Moves to the next slot of the window.
    pub fn advance(&mut self) {
        if self.offset < self.right_bound {
            self.offset += 1;
        }
    }

    /// Returns true once the window holds no further hit.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.primary_key().is_none()
    }
}

/// Heap entry for one live cursor: a direction-normalized rank (lower is
/// better) plus the source position for deterministic ties.
struct HeapEntry {
    rank: f32,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops its greatest entry; reverse both keys so the best
        // rank (and, on ties, the earliest source) comes out first.
        other
            .rank
            .total_cmp(&self.rank)
            .then_with(|| other.source.cmp(&self.source))
    }
}

fn rank_of(metric: MetricType, score: f32) -> f32 {
    if metric.higher_is_better() {
        -score
    } else {
        score
    }
}

/// Merges per-segment results into the global top-K per query.
///
/// Inputs must share shape and metric and be best-first per query, which
/// [`SearchResult`] producers guarantee. Each query is merged independently:
/// cursors are seeded into a heap, the best head is popped, emitted unless
/// its primary key was already emitted for that query, and its cursor is
/// advanced and re-seeded until `topk` hits are out or every cursor is
/// spent. Cost is `O(M log S)` per query for `M` rows consumed across `S`
/// segments.
///
/// # Panics
///
/// Panics when `results` is empty or when any result disagrees with the
/// others in `num_queries`, `topk` or metric; merging mismatched shapes is
/// a caller bug, not a recoverable state.
#[must_use]
pub fn reduce_search_results(results: &[SearchResult], topk: usize) -> ReducedResult {
    assert!(!results.is_empty(), "nothing to reduce");
    let num_queries = results[0].num_queries;
    let metric = results[0].metric;
    for result in results {
        assert_eq!(result.num_queries, num_queries, "query count mismatch");
        assert_eq!(result.topk, results[0].topk, "topk mismatch");
        assert_eq!(result.metric, metric, "metric mismatch");
    }

    let mut queries = Vec::with_capacity(num_queries);
    for q in 0..num_queries {
        let mut cursors: Vec<SearchResultPair<'_>> = results
            .iter()
            .enumerate()
            .map(|(source, result)| SearchResultPair::new(result, source, q))
            .collect();

        let mut heap: BinaryHeap<HeapEntry> = cursors
            .iter()
            .filter(|c| !c.exhausted())
            .map(|c| HeapEntry {
                rank: rank_of(metric, c.score()),
                source: c.source,
            })
            .collect();

        let mut emitted: FxHashSet<PrimaryKey> = FxHashSet::default();
        let mut merged: Vec<ReducedHit> = Vec::with_capacity(topk);
        while merged.len() < topk {
            let Some(entry) = heap.pop() else {
                break;
            };
            let cursor = &mut cursors[entry.source];
            let pk = cursor
                .primary_key()
                .expect("exhausted cursors never enter the heap")
                .clone();
            if emitted.insert(pk.clone()) {
                merged.push(ReducedHit {
                    primary_key: pk,
                    score: cursor.score(),
                    source: cursor.source,
                    offset: cursor
                        .row_offset()
                        .expect("filled slots carry an offset"),
                });
            }
            cursor.advance();
            if !cursor.exhausted() {
                heap.push(HeapEntry {
                    rank: rank_of(metric, cursor.score()),
                    source: cursor.source,
                });
            }
        }
        queries.push(merged);
    }

    tracing::debug!(
        num_queries,
        topk,
        segments = results.len(),
        "reduction finished"
    );
    ReducedResult {
        num_queries,
        topk,
        metric,
        queries,
    }
}

/// Serializes a reduced answer into one blob per requested query slice.
///
/// `slice_nqs` partitions the queries in order; its entries must be
/// positive and sum to `reduced.num_queries`. This is the wire contract the
/// RPC boundary consumes; the blobs decode with [`ReducedResult::from_blob`].
///
/// # Errors
///
/// Returns [`Error::InvalidQuery`] for a bad partition and
/// [`Error::Serialization`] on encoding failure.
pub fn marshal_reduced(reduced: &ReducedResult, slice_nqs: &[usize]) -> Result<Vec<Vec<u8>>> {
    if slice_nqs.iter().any(|&n| n == 0) {
        return Err(Error::InvalidQuery("empty query slice".into()));
    }
    if slice_nqs.iter().sum::<usize>() != reduced.num_queries {
        return Err(Error::InvalidQuery(format!(
            "query slices cover {} queries, result has {}",
            slice_nqs.iter().sum::<usize>(),
            reduced.num_queries
        )));
    }

    let mut blobs = Vec::with_capacity(slice_nqs.len());
    let mut begin = 0;
    for &nq in slice_nqs {
        let slice = ReducedResult {
            num_queries: nq,
            topk: reduced.topk,
            metric: reduced.metric,
            queries: reduced.queries[begin..begin + nq].to_vec(),
        };
        blobs.push(bincode::serialize(&slice)?);
        begin += nq;
    }
    Ok(blobs)
}

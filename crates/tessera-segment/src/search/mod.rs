//! Per-segment search results and their accumulation.
//!
//! A query against one segment produces a [`SubSearchResult`]: a dense
//! `num_queries x topk` block of row offsets and scores, best-first per
//! query, with `None` marking unfilled slots. Chunk-by-chunk search results
//! are folded together with [`SubSearchResult::absorb`]; the finished block
//! is rounded once and paired with primary keys to become a
//! [`SearchResult`], the unit the cross-segment reducer consumes.

#[cfg(test)]
mod search_tests;

use serde::{Deserialize, Serialize};

use crate::index::IndexHits;
use crate::metric::MetricType;
use crate::schema::PrimaryKey;

/// Disables score rounding when used as `round_decimal`.
pub const NO_ROUNDING: i32 = -1;

/// Partial result of one segment (or one chunk of it).
#[derive(Debug, Clone)]
pub struct SubSearchResult {
    num_queries: usize,
    topk: usize,
    metric: MetricType,
    round_decimal: i32,
    offsets: Vec<Option<usize>>,
    scores: Vec<f32>,
    rounded: bool,
}

impl SubSearchResult {
    /// Creates an all-empty block: every slot scores the metric's worst, so
    /// any real hit absorbed later displaces it.
    #[must_use]
    pub fn new(num_queries: usize, topk: usize, metric: MetricType, round_decimal: i32) -> Self {
        Self {
            num_queries,
            topk,
            metric,
            round_decimal,
            offsets: vec![None; num_queries * topk],
            scores: vec![metric.worst_score(); num_queries * topk],
            rounded: false,
        }
    }

    /// Wraps kernel hits, translating block-local labels by `base_offset`.
    #[must_use]
    pub fn from_hits(
        hits: IndexHits,
        metric: MetricType,
        round_decimal: i32,
        base_offset: usize,
    ) -> Self {
        let offsets = hits
            .labels
            .into_iter()
            .map(|label| label.map(|l| l + base_offset))
            .collect();
        Self {
            num_queries: hits.num_queries,
            topk: hits.topk,
            metric,
            round_decimal,
            offsets,
            scores: hits.scores,
            rounded: false,
        }
    }

    /// Queries covered.
    #[must_use]
    pub const fn num_queries(&self) -> usize {
        self.num_queries
    }

    /// Slots per query.
    #[must_use]
    pub const fn topk(&self) -> usize {
        self.topk
    }

    /// Metric the scores were computed under.
    #[must_use]
    pub const fn metric(&self) -> MetricType {
        self.metric
    }

    /// Offset slots of one query, best-first.
    #[must_use]
    pub fn query_offsets(&self, query: usize) -> &[Option<usize>] {
        &self.offsets[query * self.topk..(query + 1) * self.topk]
    }

    /// Score slots of one query, best-first.
    #[must_use]
    pub fn query_scores(&self, query: usize) -> &[f32] {
        &self.scores[query * self.topk..(query + 1) * self.topk]
    }

    /// Folds another partial result into this one, query by query.
    ///
    /// Both blocks must be sorted best-first, which kernels and `absorb`
    /// itself guarantee.
    ///
    /// # Panics
    ///
    /// Panics if the blocks disagree in shape, metric or rounding: merging
    /// results of different queries is a caller bug.
    pub fn absorb(&mut self, other: &Self) {
        assert_eq!(self.num_queries, other.num_queries, "query count mismatch");
        assert_eq!(self.topk, other.topk, "topk mismatch");
        assert_eq!(self.metric, other.metric, "metric mismatch");
        assert_eq!(self.round_decimal, other.round_decimal, "rounding mismatch");

        let mut merged_offsets = Vec::with_capacity(self.topk);
        let mut merged_scores = Vec::with_capacity(self.topk);
        for q in 0..self.num_queries {
            merged_offsets.clear();
            merged_scores.clear();
            merge_blocks(
                self.metric,
                self.topk,
                self.query_offsets(q),
                self.query_scores(q),
                other.query_offsets(q),
                other.query_scores(q),
                &mut merged_offsets,
                &mut merged_scores,
            );
            let base = q * self.topk;
            self.offsets[base..base + self.topk].copy_from_slice(&merged_offsets);
            self.scores[base..base + self.topk].copy_from_slice(&merged_scores);
        }
    }

    /// Rounds every score to `round_decimal` digits. Applied once, when the
    /// block is final; later stages merge the rounded values as they are.
    pub fn round_scores(&mut self) {
        debug_assert!(!self.rounded, "scores rounded twice");
        self.rounded = true;
        if self.round_decimal == NO_ROUNDING {
            return;
        }
        let multiplier = 10f32.powi(self.round_decimal);
        for (slot, score) in self.scores.iter_mut().enumerate() {
            if self.offsets[slot].is_some() {
                *score = (*score * multiplier).round() / multiplier;
            }
        }
    }

    /// Decomposes into offset and score blocks.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Option<usize>>, Vec<f32>) {
        (self.offsets, self.scores)
    }
}

/// Two-pointer merge of two best-first blocks into the best `topk` slots.
///
/// Empty slots carry the metric's worst score, so they lose against every
/// real hit and need no special casing.
#[allow(clippy::too_many_arguments)]
fn merge_blocks(
    metric: MetricType,
    topk: usize,
    left_offsets: &[Option<usize>],
    left_scores: &[f32],
    right_offsets: &[Option<usize>],
    right_scores: &[f32],
    out_offsets: &mut Vec<Option<usize>>,
    out_scores: &mut Vec<f32>,
) {
    let mut l = 0;
    let mut r = 0;
    while out_offsets.len() < topk {
        let take_left = match (l < topk, r < topk) {
            (true, true) => metric.cmp_scores(left_scores[l], right_scores[r])
                != std::cmp::Ordering::Greater,
            (true, false) => true,
            (false, true) => false,
            (false, false) => break,
        };
        if take_left {
            out_offsets.push(left_offsets[l]);
            out_scores.push(left_scores[l]);
            l += 1;
        } else {
            out_offsets.push(right_offsets[r]);
            out_scores.push(right_scores[r]);
            r += 1;
        }
    }
}

/// Finished result of one segment: offsets, scores and primary keys, all
/// `num_queries * topk` long, best-first per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Queries answered.
    pub num_queries: usize,
    /// Slots per query.
    pub topk: usize,
    /// Metric the scores are under.
    pub metric: MetricType,
    /// Row offsets within the producing segment; `None` = empty slot.
    pub offsets: Vec<Option<usize>>,
    /// Scores, already rounded by the producer.
    pub scores: Vec<f32>,
    /// Primary keys of the hit rows; `None` = empty slot.
    pub primary_keys: Vec<Option<PrimaryKey>>,
}

impl SearchResult {
    /// Pairs a finished block with the primary keys of its rows.
    ///
    /// # Panics
    ///
    /// Panics if `primary_keys` does not match the block shape, or if a
    /// filled slot comes without a key (and vice versa).
    #[must_use]
    pub fn new(sub: SubSearchResult, primary_keys: Vec<Option<PrimaryKey>>) -> Self {
        assert_eq!(
            primary_keys.len(),
            sub.num_queries * sub.topk,
            "primary key block has the wrong shape"
        );
        debug_assert!(sub
            .offsets
            .iter()
            .zip(&primary_keys)
            .all(|(o, pk)| o.is_some() == pk.is_some()));
        Self {
            num_queries: sub.num_queries,
            topk: sub.topk,
            metric: sub.metric,
            offsets: sub.offsets,
            scores: sub.scores,
            primary_keys,
        }
    }

    /// Offset slots of one query.
    #[must_use]
    pub fn query_offsets(&self, query: usize) -> &[Option<usize>] {
        &self.offsets[query * self.topk..(query + 1) * self.topk]
    }

    /// Score slots of one query.
    #[must_use]
    pub fn query_scores(&self, query: usize) -> &[f32] {
        &self.scores[query * self.topk..(query + 1) * self.topk]
    }

    /// Primary-key slots of one query.
    #[must_use]
    pub fn query_primary_keys(&self, query: usize) -> &[Option<PrimaryKey>] {
        &self.primary_keys[query * self.topk..(query + 1) * self.topk]
    }
}

//! Similarity metrics and their score ordering.
//!
//! Every search result carries the metric it was computed under; merge and
//! reduction steps consult it to decide whether higher or lower scores win.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Metric a vector field is searched under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Squared Euclidean distance. Lower is more similar.
    L2,
    /// Inner product. Higher is more similar.
    Ip,
    /// Cosine similarity. Higher is more similar.
    Cosine,
    /// Hamming distance over packed binary vectors. Lower is more similar.
    Hamming,
}

impl MetricType {
    /// Returns whether higher scores indicate more similarity.
    #[must_use]
    pub const fn higher_is_better(&self) -> bool {
        match self {
            Self::Ip | Self::Cosine => true,
            Self::L2 | Self::Hamming => false,
        }
    }

    /// The score every empty result slot starts from: anything real beats it.
    #[must_use]
    pub const fn worst_score(&self) -> f32 {
        if self.higher_is_better() {
            f32::MIN
        } else {
            f32::MAX
        }
    }

    /// Compares two scores, best first.
    ///
    /// NaN never wins: it orders after every real score regardless of
    /// direction, so a poisoned distance cannot displace a real hit.
    #[must_use]
    pub fn cmp_scores(&self, a: f32, b: f32) -> Ordering {
        match a.partial_cmp(&b) {
            Some(ord) => {
                if self.higher_is_better() {
                    ord.reverse()
                } else {
                    ord
                }
            }
            // NaN sinks to the end regardless of direction
            None => {
                if a.is_nan() && b.is_nan() {
                    Ordering::Equal
                } else if a.is_nan() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
        }
    }

    /// Returns true if `a` is strictly better than `b` under this metric.
    #[must_use]
    pub fn is_better(&self, a: f32, b: f32) -> bool {
        self.cmp_scores(a, b) == Ordering::Less
    }

    /// Sorts `(offset, score)` pairs best-first according to the metric.
    pub fn sort_hits(&self, hits: &mut [(usize, f32)]) {
        hits.sort_by(|a, b| self.cmp_scores(a.1, b.1));
    }
}

/// Computes the score of `query` against `row` under the metric.
///
/// # Panics
///
/// Panics if the slices have different lengths (callers validate dimensions
/// at the segment boundary) or if called with a binary metric.
#[must_use]
pub fn score_f32(metric: MetricType, query: &[f32], row: &[f32]) -> f32 {
    assert_eq!(query.len(), row.len(), "dimension mismatch in score_f32");
    match metric {
        MetricType::L2 => query
            .iter()
            .zip(row)
            .map(|(q, r)| {
                let d = q - r;
                d * d
            })
            .sum(),
        MetricType::Ip => query.iter().zip(row).map(|(q, r)| q * r).sum(),
        MetricType::Cosine => {
            let mut dot = 0.0f32;
            let mut qq = 0.0f32;
            let mut rr = 0.0f32;
            for (q, r) in query.iter().zip(row) {
                dot += q * r;
                qq += q * q;
                rr += r * r;
            }
            let denom = (qq * rr).sqrt();
            if denom == 0.0 {
                0.0
            } else {
                dot / denom
            }
        }
        MetricType::Hamming => unreachable!("Hamming is defined over packed binary rows"),
    }
}

/// Computes the Hamming distance between packed binary rows.
///
/// # Panics
///
/// Panics if the slices have different lengths.
#[must_use]
pub fn score_binary(query: &[u8], row: &[u8]) -> f32 {
    assert_eq!(query.len(), row.len(), "dimension mismatch in score_binary");
    let bits: u32 = query
        .iter()
        .zip(row)
        .map(|(q, r)| (q ^ r).count_ones())
        .sum();
    bits as f32
}

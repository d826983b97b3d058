//! The read surface shared by growing and sealed segments.
//!
//! Both segment kinds answer the same operations: vector search, row
//! retrieval, point lookups by primary key and size accounting, always
//! relative to a query timestamp. [`SegmentReader`] is that contract;
//! the request and result types here are what crosses it.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::column::FieldBatch;
use crate::config::LimitsConfig;
use crate::error::{Error, Result};
use crate::index::VectorsRef;
use crate::metric::MetricType;
use crate::schema::{DataType, FieldId, PrimaryKey, RowId, Schema, Timestamp};
use crate::search::SearchResult;

// ===== Requests =====

/// Query vectors in owned form, one dense block per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueryVectors {
    /// `num_queries * dim` floats.
    Float { dim: usize, data: Vec<f32> },
    /// `num_queries * dim / 8` bytes of packed binary rows.
    Binary { dim: usize, data: Vec<u8> },
}

impl QueryVectors {
    /// Borrows the block in the form kernels consume.
    #[must_use]
    pub fn as_vectors(&self) -> VectorsRef<'_> {
        match self {
            Self::Float { dim, data } => VectorsRef::Float { dim: *dim, data },
            Self::Binary { dim, data } => VectorsRef::Binary { dim: *dim, data },
        }
    }

    /// Number of query rows in the block.
    #[must_use]
    pub fn num_queries(&self) -> usize {
        self.as_vectors().row_count()
    }

    /// Declared dimensionality.
    #[must_use]
    pub const fn dim(&self) -> usize {
        match self {
            Self::Float { dim, .. } | Self::Binary { dim, .. } => *dim,
        }
    }
}

/// One vector search against a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Vector field to search.
    pub field_id: FieldId,
    /// Query block.
    pub queries: QueryVectors,
    /// Scoring metric.
    pub metric: MetricType,
    /// Slots to return per query.
    pub topk: usize,
    /// Decimal digits to keep in scores, [`crate::search::NO_ROUNDING`] to
    /// keep them raw.
    pub round_decimal: i32,
}

impl SearchRequest {
    /// Checks the request against configured limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] when topk, the query count or the
    /// rounding width is out of range.
    pub fn validate(&self, limits: &LimitsConfig) -> Result<()> {
        if self.topk == 0 || self.topk > limits.max_topk {
            return Err(Error::InvalidQuery(format!(
                "topk {} out of range [1, {}]",
                self.topk, limits.max_topk
            )));
        }
        let num_queries = self.queries.num_queries();
        if num_queries == 0 || num_queries > limits.max_queries {
            return Err(Error::InvalidQuery(format!(
                "{} queries out of range [1, {}]",
                num_queries, limits.max_queries
            )));
        }
        if !(-1..=6).contains(&self.round_decimal) {
            return Err(Error::InvalidQuery(format!(
                "round_decimal {} out of range [-1, 6]",
                self.round_decimal
            )));
        }
        Ok(())
    }
}

/// Row retrieval by predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveRequest {
    /// Fields to materialize for the matching rows.
    pub field_ids: Vec<FieldId>,
    /// Caps the number of rows returned, in offset order.
    pub limit: Option<usize>,
}

/// Marks the rows a retrieval predicate accepts.
///
/// The segment intersects the returned rows with its own visibility mask
/// (committed, timestamp-visible, not deleted); evaluators only encode the
/// filter itself. Query planning lives upstream, so this stays a hook.
pub trait PredicateEvaluator: Send + Sync {
    /// Returns the offsets in `[0, row_count)` that satisfy the predicate.
    fn evaluate(&self, row_count: usize) -> RoaringBitmap;
}

/// Accepts every row; retrieval becomes a visibility-ordered scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllRows;

impl PredicateEvaluator for AllRows {
    fn evaluate(&self, row_count: usize) -> RoaringBitmap {
        let mut rows = RoaringBitmap::new();
        rows.insert_range(0..row_count as u32);
        rows
    }
}

/// A precomputed row set used as a predicate.
impl PredicateEvaluator for RoaringBitmap {
    fn evaluate(&self, _row_count: usize) -> RoaringBitmap {
        self.clone()
    }
}

// ===== Results =====

/// Rows materialized by a retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResult {
    /// Offsets of the returned rows, ascending.
    pub offsets: Vec<usize>,
    /// Row ids of the returned rows.
    pub row_ids: Vec<RowId>,
    /// Requested fields, gathered in `offsets` order.
    pub fields: Vec<(FieldId, FieldBatch)>,
}

// ===== The reader contract =====

/// Uniform read interface over growing and sealed segments.
pub trait SegmentReader: Send + Sync {
    /// Schema the segment stores.
    fn schema(&self) -> &Schema;

    /// Rows committed and readable, regardless of timestamp.
    fn row_count(&self) -> usize;

    /// Rows whose timestamp is at or below `ts`.
    fn active_count(&self, ts: Timestamp) -> usize;

    /// Runs a vector search visible at `query_ts`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] for malformed requests,
    /// [`Error::FieldNotFound`] or [`Error::TypeMismatch`] when the target
    /// field does not hold matching vectors, and [`Error::FieldNotLoaded`]
    /// when a sealed segment is missing the data the search needs.
    fn search(&self, request: &SearchRequest, query_ts: Timestamp) -> Result<SearchResult>;

    /// Materializes rows matching `predicate`, visible at `query_ts`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] for unknown fields and
    /// [`Error::FieldNotLoaded`] when a sealed segment has not loaded one
    /// of the requested columns.
    fn retrieve(
        &self,
        request: &RetrieveRequest,
        predicate: &dyn PredicateEvaluator,
        query_ts: Timestamp,
    ) -> Result<RetrieveResult>;

    /// Offsets of live rows carrying `pk`, visible at `query_ts`.
    fn pk_offsets(&self, pk: &PrimaryKey, query_ts: Timestamp) -> Vec<usize>;

    /// Current in-memory footprint.
    fn memory_usage_bytes(&self) -> usize;
}

// ===== Shared validation =====

/// Checks a search request against the schema of the segment.
pub(crate) fn validate_search_field(schema: &Schema, request: &SearchRequest) -> Result<()> {
    let field = schema.field(request.field_id)?;
    if !field.data_type.is_vector() {
        return Err(Error::InvalidQuery(format!(
            "field {} holds {:?}, not vectors",
            field.id, field.data_type
        )));
    }
    if field.dim != request.queries.dim() {
        return Err(Error::DimensionMismatch {
            expected: field.dim,
            actual: request.queries.dim(),
        });
    }
    let query_type = match request.queries {
        QueryVectors::Float { .. } => DataType::FloatVector,
        QueryVectors::Binary { .. } => DataType::BinaryVector,
    };
    if query_type != field.data_type {
        return Err(Error::TypeMismatch {
            field: field.id,
            expected: field.data_type,
            actual: query_type,
        });
    }
    let metric_is_binary = request.metric == MetricType::Hamming;
    if metric_is_binary != (field.data_type == DataType::BinaryVector) {
        return Err(Error::InvalidQuery(format!(
            "metric {:?} does not apply to {:?}",
            request.metric, field.data_type
        )));
    }
    Ok(())
}

/// Resolves primary keys for the filled slots of a result block.
pub(crate) fn collect_primary_keys(
    offsets: &[Option<usize>],
    mut pk_at: impl FnMut(usize) -> PrimaryKey,
) -> Vec<Option<PrimaryKey>> {
    offsets
        .iter()
        .map(|slot| slot.map(&mut pk_at))
        .collect()
}

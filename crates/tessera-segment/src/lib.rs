//! # Tessera Segment
//!
//! Per-segment storage and query engine of the Tessera vector database.
//!
//! A segment is a bounded shard of rows. This crate manages one: it accepts
//! concurrent inserts and deletes, answers similarity-search and scalar
//! retrieval at an arbitrary query timestamp, and merges partial results
//! coming back from many segments into one global top-K answer.
//!
//! ## Architecture
//!
//! - **Growing segments** ([`GrowingSegment`]) are mutable and memory
//!   resident. Writers reserve disjoint row windows, fill chunked per-field
//!   columns and acknowledge; the visibility watermark advances over the
//!   largest contiguous committed prefix, so readers never see a half-written
//!   row.
//! - **Sealed segments** ([`SealedSegment`]) are immutable. Columns arrive as
//!   externally supplied blobs, vector fields may additionally be served by
//!   an externally built index, and each field's raw/index binding loads and
//!   drops independently.
//! - **Snapshot visibility**: deletes are `(primary key, timestamp)`
//!   tombstones. A query at timestamp `T` sees exactly the rows committed at
//!   or before `T` whose key was not deleted at or before `T`; on a tie the
//!   delete wins.
//! - **Reduction** ([`reduce_search_results`]) performs the cross-segment
//!   k-way merge with primary-key deduplication.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use tessera_segment::{
//!     DataType, FieldId, FieldSchema, GrowingSegment, IndexRegistry,
//!     MetricType, QueryVectors, Schema, SearchRequest, SegmentConfig,
//! };
//!
//! let schema = Schema::new(vec![
//!     FieldSchema::scalar(FieldId(100), "id", DataType::Int64).primary(),
//!     FieldSchema::vector(FieldId(101), "embedding", DataType::FloatVector, 128),
//! ])?;
//!
//! let segment = GrowingSegment::new(
//!     schema.into(),
//!     SegmentConfig::load()?,
//!     IndexRegistry::with_defaults(),
//! );
//!
//! // Write side: reserve, fill, commit.
//! let base = segment.reserve_insert(rows.len());
//! segment.insert(base, &row_ids, &timestamps, batches);
//!
//! // Read side: search at a timestamp.
//! let result = segment.search(&request, query_ts)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Row offsets and bitmap positions convert between usize and u32/f32 on hot
// paths; segments are bounded well below u32::MAX rows.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_panics_doc)]

pub mod ack;
pub mod column;
pub mod config;
#[cfg(test)]
mod config_tests;
pub mod deleted_record;
pub mod error;
pub mod growing;
pub mod index;
pub mod metric;
pub mod reduce;
pub mod schema;
pub mod sealed;
pub mod search;
pub mod segment;

pub use ack::AckResponder;
pub use column::{ChunkedColumn, ColumnData, FieldBatch};
pub use config::{ConfigError, SegmentConfig};
pub use deleted_record::DeletedRecord;
pub use error::{Error, Result};
pub use growing::GrowingSegment;
pub use index::{
    BruteForceKernel, IndexHits, IndexLoadInfo, IndexRegistry, VectorIndex, VectorsRef,
    BRUTE_FORCE_KIND,
};
pub use metric::MetricType;
pub use reduce::{
    marshal_reduced, reduce_search_results, ReducedHit, ReducedResult, SearchResultPair,
};
pub use schema::{
    DataType, FieldId, FieldSchema, PrimaryKey, RowId, Schema, Timestamp, MAX_TIMESTAMP,
};
pub use sealed::{BindingState, SealedSegment};
pub use search::{SearchResult, SubSearchResult, NO_ROUNDING};
pub use segment::{
    AllRows, PredicateEvaluator, QueryVectors, RetrieveRequest, RetrieveResult, SearchRequest,
    SegmentReader,
};

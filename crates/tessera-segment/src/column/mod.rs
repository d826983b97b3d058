//! Concurrent chunked column store.
//!
//! Storage for the growing write path: per-field columns made of fixed-size
//! chunks, written through reserved row windows and read lock-free below the
//! visibility watermark.
//!
//! # Architecture
//!
//! ```text
//! ColumnData (one per field, closed variant set)
//! └── ChunkedColumn<T>
//!     ├── chunk 0  [rows 0..chunk_rows)        immutable once covered
//!     ├── chunk 1  [chunk_rows..2*chunk_rows)  by the watermark
//!     └── chunk N  tail, readable up to the watermark
//! ```
//!
//! Writers never see each other: `reserve` hands out disjoint windows and
//! [`ChunkedColumn::write_rows`] touches only the window's cells. Readers
//! never block writers: they work on [`ChunkSlice`] views derived from the
//! watermark.

mod chunked;
mod data;


pub use chunked::{ChunkSlice, ChunkedColumn};
pub use data::{ColumnData, FieldBatch};

//! Per-chunk indexing of growing vector fields.
//!
//! A growing column's full chunks are immutable once the watermark passes
//! them, which makes them safe to index in place. When enabled, the segment
//! asks this tracker to catch up after every commit: each chunk that has
//! fallen entirely below the watermark gets a small index built through the
//! kernel registry. Searches consult the built indexes chunk by chunk and
//! scan only the mutable tail.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::column::ColumnData;
use crate::config::GrowingIndexConfig;
use crate::error::Result;
use crate::index::{IndexRegistry, VectorIndex, VectorsRef};
use crate::metric::MetricType;

/// Built chunk indexes of one growing vector field.
pub struct ChunkIndexing {
    kind: String,
    metric: MetricType,
    chunk_rows: usize,
    registry: Arc<IndexRegistry>,
    /// Serializes builders so a chunk is never indexed twice.
    build_lock: Mutex<()>,
    /// Index of chunk `i` at position `i`; only ever appended to.
    built: RwLock<Vec<Arc<dyn VectorIndex>>>,
}

impl std::fmt::Debug for ChunkIndexing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkIndexing")
            .field("kind", &self.kind)
            .field("metric", &self.metric)
            .field("built", &self.num_built())
            .finish()
    }
}

impl ChunkIndexing {
    /// Creates an empty tracker for one vector field.
    #[must_use]
    pub fn new(config: &GrowingIndexConfig, chunk_rows: usize, registry: Arc<IndexRegistry>) -> Self {
        Self {
            kind: config.kind.clone(),
            metric: config.metric,
            chunk_rows,
            registry,
            build_lock: Mutex::new(()),
            built: RwLock::new(Vec::new()),
        }
    }

    /// Metric the chunk indexes are built under. Searches with a different
    /// metric skip them and scan the raw chunk.
    #[must_use]
    pub const fn metric(&self) -> MetricType {
        self.metric
    }

    /// Number of chunks indexed so far.
    #[must_use]
    pub fn num_built(&self) -> usize {
        self.built.read().len()
    }

    /// The index covering chunk `chunk_id`, if built.
    #[must_use]
    pub fn chunk_index(&self, chunk_id: usize) -> Option<Arc<dyn VectorIndex>> {
        self.built.read().get(chunk_id).cloned()
    }

    /// Builds indexes for every chunk now fully below `watermark`.
    ///
    /// Builds run outside the directory lock; only the append of the
    /// finished index takes the write lock. Concurrent callers queue on the
    /// build lock, so each chunk is built exactly once.
    ///
    /// # Errors
    ///
    /// Propagates kernel build failures; already-built chunks stay usable.
    pub fn advance(&self, column: &ColumnData, watermark: usize) -> Result<()> {
        let target = watermark / self.chunk_rows;
        if self.built.read().len() >= target {
            return Ok(());
        }
        let _guard = self.build_lock.lock();
        loop {
            let next = self.built.read().len();
            if next >= target {
                return Ok(());
            }
            let index = match column {
                ColumnData::FloatVector { dim, column } => {
                    let chunk = column.chunk_slice(next, self.chunk_rows);
                    self.registry.build(
                        &self.kind,
                        self.metric,
                        VectorsRef::Float {
                            dim: *dim,
                            data: chunk.as_slice(),
                        },
                    )?
                }
                ColumnData::BinaryVector { dim, column } => {
                    let chunk = column.chunk_slice(next, self.chunk_rows);
                    self.registry.build(
                        &self.kind,
                        self.metric,
                        VectorsRef::Binary {
                            dim: *dim,
                            data: chunk.as_slice(),
                        },
                    )?
                }
                _ => return Ok(()),
            };
            self.built.write().push(index);
        }
    }

    /// Estimated footprint of the built indexes in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.built.read().iter().map(|i| i.memory_bytes()).sum()
    }
}

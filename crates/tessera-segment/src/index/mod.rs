//! Vector index kernels.
//!
//! The engine does not implement ANN algorithms; it consumes them through
//! [`VectorIndex`]. Kernels are registered in an [`IndexRegistry`] under a
//! string kind and reached two ways: `build` for growing per-chunk indexes
//! and `load` for sealed segments receiving externally built blobs.
//!
//! One kernel ships in-crate: [`BruteForceKernel`], the exact-scan fallback
//! used when a sealed field has raw data but no index, and the default
//! growing chunk kernel.

// ============================================================================
// Modules
// ============================================================================
mod brute_force;

#[cfg(test)]
mod brute_force_tests;

// ============================================================================
// Public API
// ============================================================================
pub use brute_force::{scan_block, BruteForceKernel};

use parking_lot::RwLock;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::metric::MetricType;

/// Kind string of the in-crate exact-scan kernel.
pub const BRUTE_FORCE_KIND: &str = "brute_force";

/// Borrowed row-major vector block: an indexed corpus or a query batch.
#[derive(Debug, Clone, Copy)]
pub enum VectorsRef<'a> {
    /// Dense `f32` rows of `dim` elements each.
    Float { dim: usize, data: &'a [f32] },
    /// Packed binary rows of `dim / 8` bytes each.
    Binary { dim: usize, data: &'a [u8] },
}

impl VectorsRef<'_> {
    /// Vector dimension.
    #[must_use]
    pub const fn dim(&self) -> usize {
        match self {
            Self::Float { dim, .. } | Self::Binary { dim, .. } => *dim,
        }
    }

    /// Number of rows in the block.
    ///
    /// # Panics
    ///
    /// Panics if the block is ragged (length not a multiple of the row
    /// width) or the dimension is 0.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Float { dim, data } => {
                assert!(*dim > 0 && data.len() % dim == 0, "ragged vector block");
                data.len() / dim
            }
            Self::Binary { dim, data } => {
                let bytes = dim / 8;
                assert!(bytes > 0 && data.len() % bytes == 0, "ragged vector block");
                data.len() / bytes
            }
        }
    }
}

/// Raw hits produced by a kernel: row labels local to the indexed block,
/// best-first per query, padded with `None` up to `topk`.
#[derive(Debug, Clone)]
pub struct IndexHits {
    /// Queries answered.
    pub num_queries: usize,
    /// Slots per query.
    pub topk: usize,
    /// `num_queries * topk` labels; `None` marks an unfilled slot.
    pub labels: Vec<Option<usize>>,
    /// `num_queries * topk` scores; unfilled slots hold the metric's worst.
    pub scores: Vec<f32>,
}

impl IndexHits {
    /// Creates an all-empty result of the right shape.
    #[must_use]
    pub fn empty(num_queries: usize, topk: usize, metric: MetricType) -> Self {
        Self {
            num_queries,
            topk,
            labels: vec![None; num_queries * topk],
            scores: vec![metric.worst_score(); num_queries * topk],
        }
    }
}

/// A searchable vector index over one contiguous block of rows.
///
/// Implementations must be immutable once built: sealed segments swap whole
/// indexes atomically and readers keep using the version they grabbed.
pub trait VectorIndex: Send + Sync {
    /// Registry kind this index was built under.
    fn kind(&self) -> &str;

    /// Metric the scores are computed under.
    fn metric(&self) -> MetricType;

    /// Rows covered by the index.
    fn row_count(&self) -> usize;

    /// Answers `topk` per query over the indexed block.
    ///
    /// `filter` is the visibility mask, bit set = row excluded. Labels in
    /// the result are block-local; callers translate them to segment
    /// offsets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] when the query width differs
    /// from the indexed vectors, [`Error::InvalidQuery`] for a zero `topk`
    /// or mismatched query kind.
    fn search(
        &self,
        queries: &VectorsRef<'_>,
        topk: usize,
        filter: Option<&RoaringBitmap>,
    ) -> Result<IndexHits>;

    /// Serializes the index into a self-contained blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] on encoding failure.
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Estimated footprint in bytes.
    fn memory_bytes(&self) -> usize;
}

/// Everything needed to reconstruct an externally built index.
#[derive(Debug, Clone)]
pub struct IndexLoadInfo {
    /// Registry kind that produced the blob.
    pub kind: String,
    /// Metric the index was built under.
    pub metric: MetricType,
    /// Vector dimension.
    pub dim: usize,
    /// Rows the index covers; checked against the segment.
    pub row_count: usize,
    /// Kernel-specific parameters.
    pub params: serde_json::Value,
    /// The serialized index.
    pub blob: Vec<u8>,
}

/// Builds an index over a vector block.
pub type BuilderFn =
    dyn Fn(MetricType, VectorsRef<'_>) -> Result<Arc<dyn VectorIndex>> + Send + Sync;

/// Reconstructs an index from a load description.
pub type LoaderFn = dyn Fn(&IndexLoadInfo) -> Result<Arc<dyn VectorIndex>> + Send + Sync;

/// Registry of index kernels, keyed by kind.
///
/// Segments hold a shared registry; queries never touch it (they go through
/// already-bound `Arc<dyn VectorIndex>` pointers), so the interior locks are
/// load/build-path only.
pub struct IndexRegistry {
    builders: RwLock<FxHashMap<String, Arc<BuilderFn>>>,
    loaders: RwLock<FxHashMap<String, Arc<LoaderFn>>>,
}

impl std::fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<String> = self.loaders.read().keys().cloned().collect();
        f.debug_struct("IndexRegistry").field("kinds", &kinds).finish()
    }
}

impl IndexRegistry {
    /// Creates a registry with the in-crate kernels registered.
    #[must_use]
    pub fn with_defaults() -> Arc<Self> {
        let registry = Self {
            builders: RwLock::new(FxHashMap::default()),
            loaders: RwLock::new(FxHashMap::default()),
        };
        registry.register(
            BRUTE_FORCE_KIND,
            Arc::new(|metric, vectors| {
                Ok(Arc::new(BruteForceKernel::build(metric, vectors)) as Arc<dyn VectorIndex>)
            }),
            Arc::new(|info| {
                let kernel = BruteForceKernel::from_blob(info)?;
                Ok(Arc::new(kernel) as Arc<dyn VectorIndex>)
            }),
        );
        Arc::new(registry)
    }

    /// Registers (or replaces) a kernel kind.
    pub fn register(&self, kind: &str, builder: Arc<BuilderFn>, loader: Arc<LoaderFn>) {
        self.builders.write().insert(kind.to_string(), builder);
        self.loaders.write().insert(kind.to_string(), loader);
    }

    /// Builds an index of the given kind over a vector block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownIndexKind`] for unregistered kinds, or
    /// whatever the kernel's builder reports.
    pub fn build(
        &self,
        kind: &str,
        metric: MetricType,
        vectors: VectorsRef<'_>,
    ) -> Result<Arc<dyn VectorIndex>> {
        let builder = self
            .builders
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::UnknownIndexKind(kind.to_string()))?;
        builder(metric, vectors)
    }

    /// Reconstructs an index from a load description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownIndexKind`] for unregistered kinds, or
    /// whatever the kernel's loader reports.
    pub fn load(&self, info: &IndexLoadInfo) -> Result<Arc<dyn VectorIndex>> {
        let loader = self
            .loaders
            .read()
            .get(&info.kind)
            .cloned()
            .ok_or_else(|| Error::UnknownIndexKind(info.kind.clone()))?;
        loader(info)
    }
}

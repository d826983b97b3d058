//! Chunked append-only element storage.
//!
//! A [`ChunkedColumn`] holds rows in fixed-size chunks. The chunk directory
//! grows under a short write lock; element writes land in windows reserved
//! through the segment's offset counter and proceed in parallel without
//! locking each other out. Full chunks are immutable once the visibility
//! watermark passes them and are shared with readers as plain slices.
//!
//! # Access protocol
//!
//! - A writer owns the window it reserved and writes each cell at most once.
//! - A reader only touches rows below the visibility watermark, which the
//!   ack responder publishes with release/acquire semantics.
//!
//! Every read helper in this module assumes that protocol; the segment types
//! are the only callers and they enforce it.

use parking_lot::RwLock;
use std::cell::UnsafeCell;
use std::sync::Arc;

/// One fixed-capacity chunk of elements.
struct Chunk<T> {
    cells: Box<[UnsafeCell<T>]>,
}

// SAFETY: access is governed by the reservation protocol above. A cell is
// written once, by the unique holder of the reserved window covering it, and
// read only after the watermark publishes it. A cell is never read and
// written concurrently.
unsafe impl<T: Send> Send for Chunk<T> {}
unsafe impl<T: Send + Sync> Sync for Chunk<T> {}

impl<T: Default> Chunk<T> {
    fn new(len: usize) -> Self {
        let cells = (0..len).map(|_| UnsafeCell::new(T::default())).collect();
        Self { cells }
    }
}

impl<T> Chunk<T> {
    /// Writes `src` starting at element `start`.
    ///
    /// # Safety
    ///
    /// The caller must hold the reservation covering the target elements and
    /// must not have committed it yet.
    unsafe fn write(&self, start: usize, src: &[T])
    where
        T: Clone,
    {
        debug_assert!(start + src.len() <= self.cells.len());
        for (i, value) in src.iter().enumerate() {
            *self.cells[start + i].get() = value.clone();
        }
    }

    /// Returns the first `len` elements as a slice.
    ///
    /// # Safety
    ///
    /// Every element in `[0, len)` must already be published by the
    /// watermark: no writer may touch it again.
    unsafe fn slice(&self, len: usize) -> &[T] {
        debug_assert!(len <= self.cells.len());
        // UnsafeCell<T> is repr(transparent) over T, so the cast is sound.
        std::slice::from_raw_parts(self.cells.as_ptr().cast::<T>(), len)
    }
}

/// A published chunk prefix, readable without holding any lock.
///
/// Holds the chunk alive; [`Self::as_slice`] borrows from it.
pub struct ChunkSlice<T> {
    chunk: Arc<Chunk<T>>,
    elements: usize,
}

impl<T> ChunkSlice<T> {
    /// The readable elements of the chunk.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `elements` was derived from the visibility watermark when
        // this view was created, so everything below it is published.
        unsafe { self.chunk.slice(self.elements) }
    }

    /// Number of readable elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements
    }

    /// Returns true if no element of the chunk is readable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements == 0
    }
}

/// Concurrent chunked column: fixed-width rows of `elements_per_row`
/// elements, stored in chunks of `chunk_rows` rows.
///
/// Chunk `i` covers rows `[i * chunk_rows, (i + 1) * chunk_rows)`. Writers
/// fill reserved row windows; the batch is split across chunk boundaries
/// when a window straddles them.
pub struct ChunkedColumn<T> {
    elements_per_row: usize,
    chunk_rows: usize,
    chunks: RwLock<Vec<Arc<Chunk<T>>>>,
}

impl<T> std::fmt::Debug for ChunkedColumn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedColumn")
            .field("elements_per_row", &self.elements_per_row)
            .field("chunk_rows", &self.chunk_rows)
            .field("num_chunks", &self.chunks.read().len())
            .finish()
    }
}

impl<T: Clone + Default + Send + Sync> ChunkedColumn<T> {
    /// Creates an empty column.
    ///
    /// # Panics
    ///
    /// Panics if either parameter is zero.
    #[must_use]
    pub fn new(elements_per_row: usize, chunk_rows: usize) -> Self {
        assert!(elements_per_row > 0, "elements_per_row must be positive");
        assert!(chunk_rows > 0, "chunk_rows must be positive");
        Self {
            elements_per_row,
            chunk_rows,
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Elements stored per row.
    #[must_use]
    pub const fn elements_per_row(&self) -> usize {
        self.elements_per_row
    }

    /// Rows per chunk.
    #[must_use]
    pub const fn chunk_rows(&self) -> usize {
        self.chunk_rows
    }

    /// Number of allocated chunks.
    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.chunks.read().len()
    }

    /// Rows the allocated chunks can hold.
    #[must_use]
    pub fn capacity_rows(&self) -> usize {
        self.num_chunks() * self.chunk_rows
    }

    /// Grows the chunk directory until it covers at least `rows` rows.
    ///
    /// Cheap when already large enough; otherwise takes the directory write
    /// lock for the duration of the allocations.
    pub fn grow_to(&self, rows: usize) {
        let needed = rows.div_ceil(self.chunk_rows);
        if self.chunks.read().len() >= needed {
            return;
        }
        let mut chunks = self.chunks.write();
        while chunks.len() < needed {
            chunks.push(Arc::new(Chunk::new(self.chunk_rows * self.elements_per_row)));
        }
    }

    /// Writes `rows` rows starting at `base_row`, splitting the batch across
    /// chunk boundaries as needed.
    ///
    /// The window `[base_row, base_row + rows)` must have been reserved by
    /// the caller and not committed yet; windows of distinct reservations
    /// never overlap, which is what makes concurrent calls sound.
    ///
    /// # Panics
    ///
    /// Panics if `data` does not hold exactly `rows * elements_per_row`
    /// elements.
    pub fn write_rows(&self, base_row: usize, rows: usize, data: &[T]) {
        assert_eq!(
            data.len(),
            rows * self.elements_per_row,
            "batch length does not match the reserved window"
        );
        if rows == 0 {
            return;
        }
        self.grow_to(base_row + rows);

        let chunks = self.chunks.read();
        let mut row = base_row;
        let mut consumed = 0;
        while row < base_row + rows {
            let chunk_id = row / self.chunk_rows;
            let offset_in_chunk = row % self.chunk_rows;
            let take = (base_row + rows - row).min(self.chunk_rows - offset_in_chunk);
            let elements = take * self.elements_per_row;
            // SAFETY: the window is reserved by this caller and uncommitted,
            // so no other writer or reader can touch these cells.
            unsafe {
                chunks[chunk_id].write(
                    offset_in_chunk * self.elements_per_row,
                    &data[consumed..consumed + elements],
                );
            }
            row += take;
            consumed += elements;
        }
    }

    /// Returns a lock-free view of chunk `chunk_id`, readable through its
    /// first `rows` rows. Callers derive `rows` from the watermark.
    ///
    /// # Panics
    ///
    /// Panics if the chunk is not allocated or `rows` exceeds the chunk.
    #[must_use]
    pub fn chunk_slice(&self, chunk_id: usize, rows: usize) -> ChunkSlice<T> {
        assert!(rows <= self.chunk_rows, "rows exceed chunk capacity");
        let chunk = Arc::clone(&self.chunks.read()[chunk_id]);
        ChunkSlice {
            chunk,
            elements: rows * self.elements_per_row,
        }
    }

    /// Copies the value of a published scalar row.
    ///
    /// # Panics
    ///
    /// Panics if the column is not scalar or the row is not allocated.
    #[must_use]
    pub fn value(&self, row: usize) -> T {
        assert_eq!(self.elements_per_row, 1, "value() is for scalar columns");
        let chunk = Arc::clone(&self.chunks.read()[row / self.chunk_rows]);
        // SAFETY: the caller only asks for rows below the watermark.
        unsafe { (*chunk.cells[row % self.chunk_rows].get()).clone() }
    }

    /// Copies all elements of a published row.
    ///
    /// # Panics
    ///
    /// Panics if the row is not allocated.
    #[must_use]
    pub fn row(&self, row: usize) -> Vec<T> {
        let chunk = Arc::clone(&self.chunks.read()[row / self.chunk_rows]);
        let start = (row % self.chunk_rows) * self.elements_per_row;
        // SAFETY: the caller only asks for rows below the watermark.
        unsafe {
            chunk
                .slice(start + self.elements_per_row)[start..]
                .to_vec()
        }
    }

    /// Calls `f` for every published row in `[start_row, end_row)`, handing
    /// it the row index and the row's elements. Walks chunk slices, so the
    /// per-row cost stays at two index computations.
    pub fn for_each_row<F>(&self, start_row: usize, end_row: usize, mut f: F)
    where
        F: FnMut(usize, &[T]),
    {
        if start_row >= end_row {
            return;
        }
        let chunks = self.chunks.read();
        let mut row = start_row;
        while row < end_row {
            let chunk_id = row / self.chunk_rows;
            let offset_in_chunk = row % self.chunk_rows;
            let take = (end_row - row).min(self.chunk_rows - offset_in_chunk);
            // SAFETY: rows below `end_row` are published by the caller's
            // watermark read.
            let slice =
                unsafe { chunks[chunk_id].slice((offset_in_chunk + take) * self.elements_per_row) };
            for i in 0..take {
                let begin = (offset_in_chunk + i) * self.elements_per_row;
                f(row + i, &slice[begin..begin + self.elements_per_row]);
            }
            row += take;
        }
    }

    /// Binary-searches the published prefix `[0, len)` of a scalar column
    /// whose values are non-decreasing, returning the first row for which
    /// `pred` is false.
    #[must_use]
    pub fn partition_point<P>(&self, len: usize, pred: P) -> usize
    where
        P: Fn(&T) -> bool,
    {
        let mut lo = 0;
        let mut hi = len;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if pred(&self.value(mid)) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Footprint of the allocated chunks in bytes. For heap-owning element
    /// types this counts the inline part only, so treat it as an estimate.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.num_chunks() * self.chunk_rows * self.elements_per_row * std::mem::size_of::<T>()
    }
}

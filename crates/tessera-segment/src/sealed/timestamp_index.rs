//! Timestamp range search for sealed segments.
//!
//! A sealed segment's timestamp column is fixed at load time, so it can
//! carry slice metadata: one `(min, max)` pair per `slice_rows` rows. A
//! query's timestamp mask then touches only the slices whose range straddles
//! the query timestamp instead of every row.

use roaring::RoaringBitmap;

use crate::schema::Timestamp;

/// Sliced min/max metadata over a sealed timestamp column.
#[derive(Debug)]
pub struct TimestampIndex {
    slice_rows: usize,
    /// `(min, max)` of each slice, in row order.
    slices: Vec<(Timestamp, Timestamp)>,
    timestamps: Vec<Timestamp>,
}

impl TimestampIndex {
    /// Builds the index over a loaded timestamp column.
    ///
    /// # Panics
    ///
    /// Panics if `slice_rows` is zero.
    #[must_use]
    pub fn build(timestamps: Vec<Timestamp>, slice_rows: usize) -> Self {
        assert!(slice_rows > 0, "slice_rows must be positive");
        let slices = timestamps
            .chunks(slice_rows)
            .map(|slice| {
                let min = slice.iter().copied().min().unwrap_or(0);
                let max = slice.iter().copied().max().unwrap_or(0);
                (min, max)
            })
            .collect();
        Self {
            slice_rows,
            slices,
            timestamps,
        }
    }

    /// Rows covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Returns true when the column is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Commit timestamp of a row.
    ///
    /// # Panics
    ///
    /// Panics if the row is out of range.
    #[must_use]
    pub fn timestamp(&self, row: usize) -> Timestamp {
        self.timestamps[row]
    }

    /// Bitmap of rows not yet committed at `query_ts` (bit set = invisible).
    ///
    /// Whole slices resolve through their `(min, max)` pair; only straddling
    /// slices are checked row by row.
    #[must_use]
    pub fn invisible_mask(&self, query_ts: Timestamp) -> RoaringBitmap {
        let mut mask = RoaringBitmap::new();
        for (i, &(min, max)) in self.slices.iter().enumerate() {
            if max <= query_ts {
                continue;
            }
            let begin = i * self.slice_rows;
            let end = (begin + self.slice_rows).min(self.timestamps.len());
            if min > query_ts {
                mask.insert_range(begin as u32..end as u32);
            } else {
                for row in begin..end {
                    if self.timestamps[row] > query_ts {
                        mask.insert(row as u32);
                    }
                }
            }
        }
        mask
    }

    /// Rows committed at or before `query_ts`.
    #[must_use]
    pub fn active_count(&self, query_ts: Timestamp) -> usize {
        let mut active = 0;
        for (i, &(min, max)) in self.slices.iter().enumerate() {
            let begin = i * self.slice_rows;
            let end = (begin + self.slice_rows).min(self.timestamps.len());
            if max <= query_ts {
                active += end - begin;
            } else if min <= query_ts {
                active += self.timestamps[begin..end]
                    .iter()
                    .filter(|&&ts| ts <= query_ts)
                    .count();
            }
        }
        active
    }

    /// Footprint of the column and slice metadata in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.timestamps.len() * 8 + self.slices.len() * 16
    }
}

//! Growing-segment insert storage.
//!
//! One [`InsertRecord`] holds everything the write path appends to: the two
//! system columns (row id, timestamp), one [`ColumnData`] per schema field,
//! the reservation counter, the ack responder and the primary-key index.
//! All stores share the same row space; the watermark published by the ack
//! responder is the single visible length for all of them.

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::ack::AckResponder;
use crate::column::{ChunkedColumn, ColumnData};
use crate::deleted_record::PkRows;
use crate::error::{Error, Result};
use crate::schema::{FieldId, PrimaryKey, RowId, Schema, Timestamp};

/// Append-only storage behind a growing segment.
pub struct InsertRecord {
    schema: Arc<Schema>,
    reserved: AtomicUsize,
    ack: AckResponder,
    timestamps: ChunkedColumn<Timestamp>,
    row_ids: ChunkedColumn<RowId>,
    columns: FxHashMap<FieldId, ColumnData>,
    /// pk -> row offsets, all rows ever committed under the key. Lock-free;
    /// filtered by barrier at query time.
    pk_index: DashMap<PrimaryKey, Vec<usize>>,
}

impl InsertRecord {
    /// Creates empty storage for the schema.
    #[must_use]
    pub fn new(schema: Arc<Schema>, chunk_rows: usize) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|field| (field.id, ColumnData::for_field(field, chunk_rows)))
            .collect();
        Self {
            schema,
            reserved: AtomicUsize::new(0),
            ack: AckResponder::new(),
            timestamps: ChunkedColumn::new(1, chunk_rows),
            row_ids: ChunkedColumn::new(1, chunk_rows),
            columns,
            pk_index: DashMap::new(),
        }
    }

    /// Reserves a window for `rows` rows, returning its base offset.
    ///
    /// Never blocks and never fails; the counter is a plain fetch-add.
    pub fn reserve(&self, rows: usize) -> usize {
        self.reserved.fetch_add(rows, Ordering::Relaxed)
    }

    /// Rows reserved so far (committed or not).
    #[must_use]
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Relaxed)
    }

    /// The visibility watermark: rows below it are readable in every column.
    #[must_use]
    pub fn watermark(&self) -> usize {
        self.ack.watermark()
    }

    /// The column behind a schema field.
    pub fn column(&self, field: FieldId) -> Result<&ColumnData> {
        self.columns.get(&field).ok_or(Error::FieldNotFound(field))
    }

    /// The timestamp system column.
    #[must_use]
    pub fn timestamps(&self) -> &ChunkedColumn<Timestamp> {
        &self.timestamps
    }

    /// The row-id system column.
    #[must_use]
    pub fn row_ids(&self) -> &ChunkedColumn<RowId> {
        &self.row_ids
    }

    /// Writes both system columns for a reserved window.
    ///
    /// # Panics
    ///
    /// Panics if slice lengths disagree.
    pub fn write_system(&self, base: usize, row_ids: &[RowId], timestamps: &[Timestamp]) {
        assert_eq!(row_ids.len(), timestamps.len(), "ragged system batch");
        self.row_ids.write_rows(base, row_ids.len(), row_ids);
        self.timestamps
            .write_rows(base, timestamps.len(), timestamps);
    }

    /// Registers primary keys for rows `[base, base + pks.len())`.
    pub fn register_pks(&self, base: usize, pks: &[PrimaryKey]) {
        for (i, pk) in pks.iter().enumerate() {
            self.pk_index.entry(pk.clone()).or_default().push(base + i);
        }
    }

    /// Acknowledges a fully written window, advancing the watermark once the
    /// prefix below it is contiguous.
    pub fn ack(&self, base: usize, end: usize) {
        self.ack.ack(base, end);
    }

    /// Rows committed at or before `ts`.
    ///
    /// Commit timestamps are non-decreasing in offset order (batches are
    /// sorted and the upstream log hands out monotonic timestamps), so this
    /// is a binary search over the published prefix.
    #[must_use]
    pub fn active_count(&self, ts: Timestamp) -> usize {
        self.timestamps
            .partition_point(self.watermark(), |&row_ts| row_ts <= ts)
    }

    /// Schema this record was built against.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Estimated footprint of all columns in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        let fields: usize = self.columns.values().map(ColumnData::memory_bytes).sum();
        fields + self.timestamps.memory_bytes() + self.row_ids.memory_bytes()
    }
}

impl PkRows for InsertRecord {
    fn pk_offsets_below(&self, pk: &PrimaryKey, barrier: usize) -> Vec<usize> {
        match self.pk_index.get(pk) {
            Some(offsets) => offsets.iter().copied().filter(|&o| o < barrier).collect(),
            None => Vec::new(),
        }
    }

    fn row_timestamp(&self, offset: usize) -> Timestamp {
        self.timestamps.value(offset)
    }
}

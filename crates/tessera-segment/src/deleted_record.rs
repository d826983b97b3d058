//! Tombstone storage and snapshot delete masking.
//!
//! Deletes arrive as `(primary key, timestamp)` tombstones and are strictly
//! additive. A query at timestamp `T` must not see a row whose key was
//! deleted at or before `T`; [`DeletedRecord::deleted_bitmap`] computes that
//! mask, reusing the previous answer when only new tombstones arrived.
//!
//! Both segment kinds embed one of these: growing segments feed it from the
//! live delete path, sealed segments from replayed delete logs plus the live
//! path.

use parking_lot::Mutex;
use roaring::RoaringBitmap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::ack::AckResponder;
use crate::column::ChunkedColumn;
use crate::schema::{PrimaryKey, Timestamp};

/// Row resolution a delete mask needs from the insert side.
///
/// Implemented by the growing insert record and by sealed segments once
/// their primary-key and timestamp columns are loaded.
pub trait PkRows {
    /// Offsets below `barrier` holding rows with this key, any order.
    fn pk_offsets_below(&self, pk: &PrimaryKey, barrier: usize) -> Vec<usize>;

    /// Commit timestamp of a published row.
    fn row_timestamp(&self, offset: usize) -> Timestamp;
}

struct CachedBitmap {
    del_barrier: usize,
    insert_barrier: usize,
    bitmap: Arc<RoaringBitmap>,
}

/// Append-only tombstone store with an incremental delete-mask cache.
pub struct DeletedRecord {
    reserved: AtomicUsize,
    ack: AckResponder,
    pks: ChunkedColumn<PrimaryKey>,
    timestamps: ChunkedColumn<Timestamp>,
    cache: Mutex<Option<CachedBitmap>>,
}

impl std::fmt::Debug for DeletedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletedRecord")
            .field("committed", &self.watermark())
            .finish()
    }
}

impl DeletedRecord {
    /// Creates an empty tombstone store.
    #[must_use]
    pub fn new(chunk_rows: usize) -> Self {
        Self {
            reserved: AtomicUsize::new(0),
            ack: AckResponder::new(),
            pks: ChunkedColumn::new(1, chunk_rows),
            timestamps: ChunkedColumn::new(1, chunk_rows),
            cache: Mutex::new(None),
        }
    }

    /// Reserves a window for `rows` tombstones, returning its base offset.
    pub fn reserve(&self, rows: usize) -> usize {
        self.reserved.fetch_add(rows, Ordering::Relaxed)
    }

    /// Writes a reserved tombstone window and acknowledges it.
    ///
    /// The batch must already be sorted by timestamp; the caller owns that
    /// ordering (growing/sealed delete paths sort before writing).
    ///
    /// # Panics
    ///
    /// Panics if the slices disagree in length.
    pub fn write(&self, base: usize, pks: &[PrimaryKey], timestamps: &[Timestamp]) {
        assert_eq!(pks.len(), timestamps.len(), "ragged tombstone batch");
        debug_assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        self.pks.write_rows(base, pks.len(), pks);
        self.timestamps.write_rows(base, timestamps.len(), timestamps);
        self.ack.ack(base, base + pks.len());
    }

    /// Tombstones visible to readers (largest contiguous acked prefix).
    #[must_use]
    pub fn watermark(&self) -> usize {
        self.ack.watermark()
    }

    /// Number of committed tombstones with timestamp at or below `ts`.
    ///
    /// This is the delete barrier a query at `ts` runs under. Tombstones at
    /// exactly `ts` are included: on an insert/delete timestamp tie, the
    /// delete wins.
    #[must_use]
    pub fn del_barrier(&self, ts: Timestamp) -> usize {
        self.timestamps
            .partition_point(self.watermark(), |&del_ts| del_ts <= ts)
    }

    /// Computes the delete mask for a query: bit set = row invisible.
    ///
    /// `del_barrier` bounds the tombstones applied, `insert_barrier` bounds
    /// the rows they may hit (rows at or past it are not visible to the
    /// query anyway). The result is cached per `(del_barrier,
    /// insert_barrier)`; a later call that only advances the delete barrier
    /// extends the cached mask with the new tombstones instead of replaying
    /// all of them.
    ///
    /// `query_ts` clamps the barrier so a caller can never apply tombstones
    /// from beyond its snapshot, which keeps the cache reusable across
    /// queries at different timestamps.
    pub fn deleted_bitmap(
        &self,
        del_barrier: usize,
        insert_barrier: usize,
        rows: &dyn PkRows,
        query_ts: Timestamp,
    ) -> Arc<RoaringBitmap> {
        let del_barrier = del_barrier.min(self.del_barrier(query_ts));

        let mut cache = self.cache.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.insert_barrier == insert_barrier && cached.del_barrier == del_barrier {
                return Arc::clone(&cached.bitmap);
            }
        }

        let (mut bitmap, applied) = match cache.as_ref() {
            Some(cached)
                if cached.insert_barrier == insert_barrier
                    && cached.del_barrier < del_barrier =>
            {
                ((*cached.bitmap).clone(), cached.del_barrier)
            }
            _ => (RoaringBitmap::new(), 0),
        };

        self.apply_window(&mut bitmap, applied, del_barrier, insert_barrier, rows);

        let bitmap = Arc::new(bitmap);
        *cache = Some(CachedBitmap {
            del_barrier,
            insert_barrier,
            bitmap: Arc::clone(&bitmap),
        });
        bitmap
    }

    /// Applies tombstones `[from, to)` against rows below `insert_barrier`.
    fn apply_window(
        &self,
        bitmap: &mut RoaringBitmap,
        from: usize,
        to: usize,
        insert_barrier: usize,
        rows: &dyn PkRows,
    ) {
        for tombstone in from..to {
            let pk = self.pks.value(tombstone);
            let del_ts = self.timestamps.value(tombstone);
            for offset in rows.pk_offsets_below(&pk, insert_barrier) {
                // A tombstone kills rows committed at or before it; rows
                // re-inserted later under the same key survive.
                if rows.row_timestamp(offset) <= del_ts {
                    bitmap.insert(offset as u32);
                }
            }
        }
    }

    /// Estimated footprint of the tombstone columns in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.pks.memory_bytes() + self.timestamps.memory_bytes()
    }
}

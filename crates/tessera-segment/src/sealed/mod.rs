//! Sealed segments: the immutable, externally-fed shard form.
//!
//! A sealed segment starts empty and is populated by explicit load calls:
//! raw column blobs, externally built vector indexes, system columns and
//! replayed delete logs. Each field binds its raw and index representations
//! independently; the slow part of a load (deserialization, index
//! reconstruction) happens off to the side and only the final pointer swap
//! is atomic, so readers that captured the old pointer keep using it until
//! they finish.
//!
//! Queries follow the same snapshot rules as growing segments: the
//! timestamp mask comes from a sliced [`TimestampIndex`] rather than a scan,
//! and tombstones resolve primary keys through the index built when the key
//! column loaded.

mod timestamp_index;


pub use timestamp_index::TimestampIndex;

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::column::FieldBatch;
use crate::config::SegmentConfig;
use crate::deleted_record::{DeletedRecord, PkRows};
use crate::error::{Error, Result};
use crate::index::{scan_block, IndexLoadInfo, IndexRegistry, VectorIndex};
use crate::schema::{FieldId, PrimaryKey, RowId, Schema, Timestamp};
use crate::search::{SearchResult, SubSearchResult};
use crate::segment::{
    collect_primary_keys, validate_search_field, PredicateEvaluator, RetrieveRequest,
    RetrieveResult, SearchRequest, SegmentReader,
};

/// Which representations of a field are currently bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Neither raw data nor an index is loaded.
    Unloaded,
    /// Only the raw column blob is loaded.
    RawLoaded,
    /// Only an externally built index is loaded.
    IndexLoaded,
    /// Both representations are loaded.
    RawAndIndexLoaded,
}

/// An index bound to a field.
struct BoundIndex {
    index: Arc<dyn VectorIndex>,
}

/// Per-field binding: two independently swappable representations.
#[derive(Default)]
struct FieldSlot {
    raw: ArcSwapOption<FieldBatch>,
    index: ArcSwapOption<BoundIndex>,
}

type PkIndex = FxHashMap<PrimaryKey, Vec<usize>>;

/// An immutable segment whose columns and indexes are supplied by load
/// calls, still accepting deletes.
pub struct SealedSegment {
    schema: Arc<Schema>,
    config: SegmentConfig,
    registry: Arc<IndexRegistry>,
    /// Established row count; the first load fixes it, later loads must
    /// agree.
    row_count: RwLock<Option<usize>>,
    slots: FxHashMap<FieldId, FieldSlot>,
    row_ids: ArcSwapOption<Vec<RowId>>,
    timestamps: ArcSwapOption<TimestampIndex>,
    /// pk -> row offsets, built when the primary key column loads.
    pk_index: ArcSwapOption<PkIndex>,
    deleted: DeletedRecord,
}

impl std::fmt::Debug for SealedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedSegment")
            .field("rows", &self.row_count())
            .field("tombstones", &self.deleted.watermark())
            .finish()
    }
}

impl SealedSegment {
    /// Creates an empty sealed segment awaiting load calls.
    #[must_use]
    pub fn new(schema: Arc<Schema>, config: SegmentConfig, registry: Arc<IndexRegistry>) -> Self {
        let slots = schema
            .fields()
            .iter()
            .map(|f| (f.id, FieldSlot::default()))
            .collect();
        let deleted = DeletedRecord::new(config.column.chunk_rows);
        Self {
            schema,
            config,
            registry,
            row_count: RwLock::new(None),
            slots,
            row_ids: ArcSwapOption::empty(),
            timestamps: ArcSwapOption::empty(),
            pk_index: ArcSwapOption::empty(),
            deleted,
        }
    }

    // ===== Loading =====

    /// Loads the system columns: one row id and one commit timestamp per
    /// row. The timestamp index is built before the swap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RowCountMismatch`] when the columns disagree with
    /// each other or with the established row count, and
    /// [`Error::AlreadyLoaded`] when system data was loaded before.
    pub fn load_system_data(
        &self,
        row_ids: Vec<RowId>,
        timestamps: Vec<Timestamp>,
    ) -> Result<()> {
        if row_ids.len() != timestamps.len() {
            return Err(Error::RowCountMismatch {
                expected: row_ids.len(),
                actual: timestamps.len(),
            });
        }
        if self.row_ids.load().is_some() {
            return Err(Error::AlreadyLoaded {
                field: crate::schema::ROW_ID_FIELD,
                what: "system data",
            });
        }
        self.reconcile_row_count(row_ids.len())?;
        let index = TimestampIndex::build(timestamps, self.config.sealed.timestamp_slice_rows);
        tracing::info!(rows = row_ids.len(), "sealed system data loaded");
        self.timestamps.store(Some(Arc::new(index)));
        self.row_ids.store(Some(Arc::new(row_ids)));
        Ok(())
    }

    /// Binds the raw column blob of a field.
    ///
    /// Loading the primary key field also builds the pk -> offsets index
    /// tombstone resolution runs on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`], [`Error::TypeMismatch`] /
    /// [`Error::DimensionMismatch`] for a blob that disagrees with the
    /// schema, [`Error::RowCountMismatch`] against the established row
    /// count, and [`Error::AlreadyLoaded`] when raw data is already bound.
    pub fn load_field_data(&self, field_id: FieldId, batch: FieldBatch) -> Result<()> {
        let field = self.schema.field(field_id)?;
        batch.validate_against(field)?;
        let slot = self.slot(field_id)?;
        if slot.raw.load().is_some() {
            return Err(Error::AlreadyLoaded {
                field: field_id,
                what: "raw data",
            });
        }
        self.reconcile_row_count(batch.row_count())?;

        if field.is_primary {
            let mut index = PkIndex::default();
            for row in 0..batch.row_count() {
                let pk = batch
                    .primary_key_at(row)
                    .expect("primary key type checked by the schema");
                index.entry(pk).or_default().push(row);
            }
            self.pk_index.store(Some(Arc::new(index)));
        }
        tracing::info!(field = %field_id, rows = batch.row_count(), "sealed field data loaded");
        slot.raw.store(Some(Arc::new(batch)));
        Ok(())
    }

    /// Binds an externally built index to a vector field.
    ///
    /// Reconstruction runs through the kernel registry before the swap;
    /// concurrent readers are never blocked on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`], [`Error::InvalidQuery`] for a
    /// scalar target, [`Error::DimensionMismatch`] /
    /// [`Error::RowCountMismatch`] when the description disagrees with the
    /// schema or segment, [`Error::AlreadyLoaded`] when an index is already
    /// bound, [`Error::UnknownIndexKind`] for unregistered kinds, and
    /// whatever the kernel loader reports.
    pub fn load_index(&self, field_id: FieldId, info: &IndexLoadInfo) -> Result<()> {
        let field = self.schema.field(field_id)?;
        if !field.data_type.is_vector() {
            return Err(Error::InvalidQuery(format!(
                "field {field_id} holds {:?}, which cannot take a vector index",
                field.data_type
            )));
        }
        if info.dim != field.dim {
            return Err(Error::DimensionMismatch {
                expected: field.dim,
                actual: info.dim,
            });
        }
        let slot = self.slot(field_id)?;
        if slot.index.load().is_some() {
            return Err(Error::AlreadyLoaded {
                field: field_id,
                what: "index",
            });
        }
        self.reconcile_row_count(info.row_count)?;

        let index = self.registry.load(info)?;
        if index.row_count() != info.row_count {
            return Err(Error::RowCountMismatch {
                expected: info.row_count,
                actual: index.row_count(),
            });
        }
        tracing::info!(field = %field_id, kind = %info.kind, rows = info.row_count, "sealed index loaded");
        slot.index.store(Some(Arc::new(BoundIndex { index })));
        Ok(())
    }

    /// Replays a delete log into the segment's tombstone store.
    ///
    /// The batch is sorted by timestamp before writing, like the live path.
    ///
    /// # Panics
    ///
    /// Panics if the slices disagree in length.
    pub fn load_deleted_record(&self, pks: &[PrimaryKey], timestamps: &[Timestamp]) {
        let base = self.deleted.reserve(pks.len());
        self.delete(base, pks, timestamps);
        tracing::info!(rows = pks.len(), "sealed delete log replayed");
    }

    /// Unbinds the raw data of a field, leaving any index in place.
    ///
    /// Dropping the primary key column also drops the pk index, so delete
    /// resolution needs it reloaded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] for unknown fields.
    pub fn drop_field_data(&self, field_id: FieldId) -> Result<()> {
        let field = self.schema.field(field_id)?;
        self.slot(field_id)?.raw.store(None);
        if field.is_primary {
            self.pk_index.store(None);
        }
        tracing::info!(field = %field_id, "sealed field data dropped");
        Ok(())
    }

    /// Unbinds the index of a field, leaving any raw data in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] for unknown fields.
    pub fn drop_index(&self, field_id: FieldId) -> Result<()> {
        self.slot(field_id)?.index.store(None);
        tracing::info!(field = %field_id, "sealed index dropped");
        Ok(())
    }

    /// Current binding state of a field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] for unknown fields.
    pub fn binding_state(&self, field_id: FieldId) -> Result<BindingState> {
        let slot = self.slot(field_id)?;
        Ok(
            match (slot.raw.load().is_some(), slot.index.load().is_some()) {
                (false, false) => BindingState::Unloaded,
                (true, false) => BindingState::RawLoaded,
                (false, true) => BindingState::IndexLoaded,
                (true, true) => BindingState::RawAndIndexLoaded,
            },
        )
    }

    // ===== Deletes =====

    /// Reserves a tombstone window for `rows` deletes.
    pub fn reserve_delete(&self, rows: usize) -> usize {
        self.deleted.reserve(rows)
    }

    /// Commits a reserved tombstone window, sorted by timestamp first.
    ///
    /// # Panics
    ///
    /// Panics if the slices disagree in length or the window was committed
    /// before.
    pub fn delete(&self, base: usize, pks: &[PrimaryKey], timestamps: &[Timestamp]) {
        assert_eq!(pks.len(), timestamps.len(), "ragged delete batch");
        let mut entries: Vec<(Timestamp, &PrimaryKey)> =
            timestamps.iter().copied().zip(pks).collect();
        entries.sort_by_key(|(ts, _)| *ts);
        let sorted_ts: Vec<Timestamp> = entries.iter().map(|(ts, _)| *ts).collect();
        let sorted_pks: Vec<PrimaryKey> = entries.iter().map(|(_, pk)| (*pk).clone()).collect();
        self.deleted.write(base, &sorted_pks, &sorted_ts);
    }

    // ===== Queries =====

    /// Runs a vector search over the rows visible at `query_ts`.
    ///
    /// A bound index under the request's metric answers directly; otherwise
    /// raw data is scanned exactly; with neither the field is not loaded.
    ///
    /// # Errors
    ///
    /// See [`SegmentReader::search`].
    pub fn search(&self, request: &SearchRequest, query_ts: Timestamp) -> Result<SearchResult> {
        request.validate(&self.config.limits)?;
        validate_search_field(&self.schema, request)?;

        let num_queries = request.queries.num_queries();
        let ts_index = self.timestamp_index()?;
        let pk_column = self.primary_column()?;
        let mask = self.visibility_mask(&ts_index, query_ts)?;

        let slot = self.slot(request.field_id)?;
        let queries = request.queries.as_vectors();
        let bound = slot
            .index
            .load_full()
            .filter(|b| b.index.metric() == request.metric);
        let hits = match bound {
            Some(bound) => bound.index.search(&queries, request.topk, Some(&mask))?,
            None => match slot.raw.load_full() {
                Some(raw) => {
                    let corpus = raw
                        .as_vectors()
                        .expect("search field validated as a vector column");
                    scan_block(request.metric, &corpus, &queries, request.topk, Some(&mask))?
                }
                None => {
                    return Err(Error::FieldNotLoaded {
                        field: request.field_id,
                        required: "a vector index or raw column data",
                    })
                }
            },
        };

        let mut sub =
            SubSearchResult::from_hits(hits, request.metric, request.round_decimal, 0);
        sub.round_scores();
        let offsets: Vec<Option<usize>> = (0..num_queries)
            .flat_map(|q| sub.query_offsets(q).iter().copied())
            .collect();
        let pks = collect_primary_keys(&offsets, |o| self.pk_at(o, pk_column.as_deref()));
        tracing::debug!(
            field = %request.field_id,
            num_queries,
            topk = request.topk,
            "sealed search finished"
        );
        Ok(SearchResult::new(sub, pks))
    }

    /// Materializes the rows `predicate` accepts that are visible at
    /// `query_ts`, in offset order.
    ///
    /// # Errors
    ///
    /// See [`SegmentReader::retrieve`].
    pub fn retrieve(
        &self,
        request: &RetrieveRequest,
        predicate: &dyn PredicateEvaluator,
        query_ts: Timestamp,
    ) -> Result<RetrieveResult> {
        let rows = self.row_count();
        let ts_index = self.timestamp_index()?;
        let row_ids = self.row_ids.load_full().ok_or(Error::FieldNotLoaded {
            field: crate::schema::ROW_ID_FIELD,
            required: "system row id column",
        })?;
        let mut included = predicate.evaluate(rows);
        included.remove_range(rows as u32..=u32::MAX);
        included -= self.visibility_mask(&ts_index, query_ts)?;

        let limit = request.limit.unwrap_or(usize::MAX);
        let offsets: Vec<usize> = included.iter().take(limit).map(|o| o as usize).collect();
        let picked_row_ids = offsets.iter().map(|&o| row_ids[o]).collect();
        let mut fields = Vec::with_capacity(request.field_ids.len());
        for &id in &request.field_ids {
            self.schema.field(id)?;
            let raw = self
                .slot(id)?
                .raw
                .load_full()
                .ok_or(Error::FieldNotLoaded {
                    field: id,
                    required: "raw column data",
                })?;
            fields.push((id, raw.gather(&offsets)));
        }
        Ok(RetrieveResult {
            offsets,
            row_ids: picked_row_ids,
            fields,
        })
    }

    /// Established row count, 0 before the first load.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_count.read().unwrap_or(0)
    }

    /// Rows committed at or before `ts`; 0 until system data loads.
    #[must_use]
    pub fn active_count(&self, ts: Timestamp) -> usize {
        self.timestamps
            .load_full()
            .map_or(0, |index| index.active_count(ts))
    }

    /// Offsets of live rows carrying `pk` at `query_ts`, ascending. Empty
    /// until the primary key column and system data load.
    #[must_use]
    pub fn pk_offsets(&self, pk: &PrimaryKey, query_ts: Timestamp) -> Vec<usize> {
        let (Some(pk_index), Some(ts_index)) =
            (self.pk_index.load_full(), self.timestamps.load_full())
        else {
            return Vec::new();
        };
        let Ok(mask) = self.visibility_mask(&ts_index, query_ts) else {
            return Vec::new();
        };
        let mut offsets: Vec<usize> = pk_index
            .get(pk)
            .map(|rows| {
                rows.iter()
                    .copied()
                    .filter(|&o| !mask.contains(o as u32))
                    .collect()
            })
            .unwrap_or_default();
        offsets.sort_unstable();
        offsets
    }

    /// Estimated in-memory footprint in bytes.
    #[must_use]
    pub fn memory_usage_bytes(&self) -> usize {
        let mut total = self.deleted.memory_bytes();
        for slot in self.slots.values() {
            if let Some(raw) = slot.raw.load_full() {
                total += raw.memory_bytes();
            }
            if let Some(bound) = slot.index.load_full() {
                total += bound.index.memory_bytes();
            }
        }
        if let Some(row_ids) = self.row_ids.load_full() {
            total += row_ids.len() * 8;
        }
        if let Some(ts_index) = self.timestamps.load_full() {
            total += ts_index.memory_bytes();
        }
        total
    }

    /// Schema the segment was constructed against.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The tombstone store.
    #[must_use]
    pub fn deleted_record(&self) -> &DeletedRecord {
        &self.deleted
    }

    // ===== Internals =====

    fn slot(&self, field_id: FieldId) -> Result<&FieldSlot> {
        self.slots.get(&field_id).ok_or(Error::FieldNotFound(field_id))
    }

    /// Fixes the row count on first load; later loads must agree.
    fn reconcile_row_count(&self, actual: usize) -> Result<()> {
        let mut established = self.row_count.write();
        match *established {
            None => {
                *established = Some(actual);
                Ok(())
            }
            Some(expected) if expected == actual => Ok(()),
            Some(expected) => Err(Error::RowCountMismatch { expected, actual }),
        }
    }

    fn timestamp_index(&self) -> Result<Arc<TimestampIndex>> {
        self.timestamps.load_full().ok_or(Error::FieldNotLoaded {
            field: crate::schema::TIMESTAMP_FIELD,
            required: "system timestamp column",
        })
    }

    /// The primary key column, required for query output and tombstone
    /// resolution when the schema declares a key.
    fn primary_column(&self) -> Result<Option<Arc<FieldBatch>>> {
        let Some(primary) = self.schema.primary_field_id() else {
            return Ok(None);
        };
        match self.slot(primary)?.raw.load_full() {
            Some(raw) => Ok(Some(raw)),
            None => Err(Error::FieldNotLoaded {
                field: primary,
                required: "primary key column",
            }),
        }
    }

    /// Full invisibility mask at `query_ts`: uncommitted rows plus deleted
    /// rows. Bit set = row excluded.
    fn visibility_mask(
        &self,
        ts_index: &Arc<TimestampIndex>,
        query_ts: Timestamp,
    ) -> Result<RoaringBitmap> {
        let mut mask = ts_index.invisible_mask(query_ts);
        if self.deleted.watermark() > 0 {
            let pk_index = self.pk_index.load_full().ok_or_else(|| {
                Error::FieldNotLoaded {
                    field: self
                        .schema
                        .primary_field_id()
                        .unwrap_or(crate::schema::ROW_ID_FIELD),
                    required: "primary key column for tombstone resolution",
                }
            })?;
            let rows = SealedRows {
                pk_index,
                ts_index: Arc::clone(ts_index),
            };
            let deleted =
                self.deleted
                    .deleted_bitmap(self.deleted.watermark(), ts_index.len(), &rows, query_ts);
            mask |= &*deleted;
        }
        Ok(mask)
    }

    fn pk_at(&self, offset: usize, pk_column: Option<&FieldBatch>) -> PrimaryKey {
        match pk_column {
            Some(batch) => batch
                .primary_key_at(offset)
                .expect("primary key type checked by the schema"),
            None => {
                let row_ids = self
                    .row_ids
                    .load_full()
                    .expect("system data checked before filling results");
                PrimaryKey::Int64(row_ids[offset])
            }
        }
    }
}

/// Tombstone resolution view over the loaded pk and timestamp columns.
struct SealedRows {
    pk_index: Arc<PkIndex>,
    ts_index: Arc<TimestampIndex>,
}

impl PkRows for SealedRows {
    fn pk_offsets_below(&self, pk: &PrimaryKey, barrier: usize) -> Vec<usize> {
        self.pk_index
            .get(pk)
            .map(|rows| rows.iter().copied().filter(|&o| o < barrier).collect())
            .unwrap_or_default()
    }

    fn row_timestamp(&self, offset: usize) -> Timestamp {
        self.ts_index.timestamp(offset)
    }
}

impl SegmentReader for SealedSegment {
    fn schema(&self) -> &Schema {
        self.schema()
    }

    fn row_count(&self) -> usize {
        self.row_count()
    }

    fn active_count(&self, ts: Timestamp) -> usize {
        self.active_count(ts)
    }

    fn search(&self, request: &SearchRequest, query_ts: Timestamp) -> Result<SearchResult> {
        self.search(request, query_ts)
    }

    fn retrieve(
        &self,
        request: &RetrieveRequest,
        predicate: &dyn PredicateEvaluator,
        query_ts: Timestamp,
    ) -> Result<RetrieveResult> {
        self.retrieve(request, predicate, query_ts)
    }

    fn pk_offsets(&self, pk: &PrimaryKey, query_ts: Timestamp) -> Vec<usize> {
        self.pk_offsets(pk, query_ts)
    }

    fn memory_usage_bytes(&self) -> usize {
        self.memory_usage_bytes()
    }
}

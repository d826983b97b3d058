//! Growing segments: the mutable, append-only shard form.
//!
//! The write path follows the reserve/commit protocol: `reserve_insert`
//! claims a disjoint row window on a plain atomic counter, `insert` fills
//! every column of that window and acknowledges it, and the visibility
//! watermark advances over the largest contiguous acknowledged prefix.
//! Writers to different windows never contend; readers only ever observe
//! the committed prefix.
//!
//! Deletes follow the same protocol against the segment's tombstone store
//! and never block reads: a query computes its delete mask once, at call
//! time, from the tombstones committed at that point.

mod indexing;
mod insert_record;

#[cfg(test)]
mod growing_tests;

pub use indexing::ChunkIndexing;
pub use insert_record::InsertRecord;

use roaring::RoaringBitmap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use crate::column::{ColumnData, FieldBatch};
use crate::config::SegmentConfig;
use crate::deleted_record::{DeletedRecord, PkRows};
use crate::error::Result;
use crate::index::{scan_block, IndexRegistry, VectorsRef};
use crate::schema::{FieldId, PrimaryKey, RowId, Schema, Timestamp};
use crate::search::{SearchResult, SubSearchResult};
use crate::segment::{
    collect_primary_keys, validate_search_field, PredicateEvaluator, RetrieveRequest,
    RetrieveResult, SearchRequest, SegmentReader,
};

/// A mutable, memory-resident segment accepting concurrent inserts and
/// deletes while serving timestamped queries.
pub struct GrowingSegment {
    schema: Arc<Schema>,
    config: SegmentConfig,
    insert_record: InsertRecord,
    deleted_record: DeletedRecord,
    /// Chunk-index trackers for vector fields, present only when the config
    /// enables growing auto-indexing.
    indexing: FxHashMap<FieldId, ChunkIndexing>,
}

impl std::fmt::Debug for GrowingSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrowingSegment")
            .field("rows", &self.insert_record.watermark())
            .field("tombstones", &self.deleted_record.watermark())
            .finish()
    }
}

impl GrowingSegment {
    /// Creates an empty growing segment for the schema.
    #[must_use]
    pub fn new(schema: Arc<Schema>, config: SegmentConfig, registry: Arc<IndexRegistry>) -> Self {
        let chunk_rows = config.column.chunk_rows;
        let indexing = if config.growing_index.enabled {
            schema
                .fields()
                .iter()
                .filter(|f| f.data_type.is_vector())
                .map(|f| {
                    (
                        f.id,
                        ChunkIndexing::new(&config.growing_index, chunk_rows, Arc::clone(&registry)),
                    )
                })
                .collect()
        } else {
            FxHashMap::default()
        };
        Self {
            insert_record: InsertRecord::new(Arc::clone(&schema), chunk_rows),
            deleted_record: DeletedRecord::new(chunk_rows),
            schema,
            config,
            indexing,
        }
    }

    /// Reserves a window for `rows` rows and returns its base offset.
    ///
    /// Never blocks and never rejects; every reservation must be followed by
    /// exactly one [`Self::insert`] for the same window or the watermark
    /// stalls at its base.
    pub fn reserve_insert(&self, rows: usize) -> usize {
        self.insert_record.reserve(rows)
    }

    /// Commits a reserved window: writes every column, registers primary
    /// keys and acknowledges, advancing the watermark once the prefix below
    /// the window is contiguous.
    ///
    /// The batch is sorted by timestamp before writing so the timestamp
    /// column stays ordered within the window; ordering across windows is an
    /// upstream log guarantee.
    ///
    /// # Panics
    ///
    /// Panics on every contract violation: ragged slices, a batch set that
    /// does not cover the schema exactly, a batch whose type or dimension
    /// disagrees with its field, or a window committed twice. The window is
    /// already claimed when these surface, so they are caller bugs and not
    /// recoverable.
    pub fn insert(
        &self,
        base: usize,
        row_ids: &[RowId],
        timestamps: &[Timestamp],
        fields: Vec<(FieldId, FieldBatch)>,
    ) {
        let rows = row_ids.len();
        assert_eq!(timestamps.len(), rows, "ragged insert batch");
        assert_eq!(
            fields.len(),
            self.schema.fields().len(),
            "insert batch must cover every schema field exactly once"
        );
        let mut seen = FxHashSet::default();
        for (id, batch) in &fields {
            assert!(seen.insert(*id), "field {id} appears twice in the batch");
            let field = self
                .schema
                .field(*id)
                .unwrap_or_else(|_| panic!("unknown field {id} in insert batch"));
            assert_eq!(
                batch.row_count(),
                rows,
                "batch for field {id} does not match the reserved window"
            );
            if let Err(e) = batch.validate_against(field) {
                panic!("invalid batch for field {id}: {e}");
            }
        }

        let order = sort_permutation(timestamps);
        let (row_ids, timestamps, fields) = match &order {
            Some(order) => (
                order.iter().map(|&i| row_ids[i]).collect(),
                order.iter().map(|&i| timestamps[i]).collect(),
                fields
                    .into_iter()
                    .map(|(id, batch)| (id, batch.gather(order)))
                    .collect(),
            ),
            None => (row_ids.to_vec(), timestamps.to_vec(), fields),
        };

        let pks = self.batch_primary_keys(&row_ids, &fields);
        self.insert_record.write_system(base, &row_ids, &timestamps);
        for (id, batch) in &fields {
            self.insert_record
                .column(*id)
                .expect("batch ids validated above")
                .write_batch(base, batch);
        }
        self.insert_record.register_pks(base, &pks);
        self.insert_record.ack(base, base + rows);
        tracing::debug!(
            base,
            rows,
            watermark = self.insert_record.watermark(),
            "insert committed"
        );

        self.refresh_chunk_indexes();
    }

    /// Reserves a tombstone window for `rows` deletes.
    pub fn reserve_delete(&self, rows: usize) -> usize {
        self.deleted_record.reserve(rows)
    }

    /// Commits a reserved tombstone window.
    ///
    /// The batch is sorted by timestamp before writing, mirroring the insert
    /// path. Deletes never block reads.
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
        self.deleted_record.write(base, &sorted_pks, &sorted_ts);
        tracing::debug!(
            base,
            rows = pks.len(),
            committed = self.deleted_record.watermark(),
            "delete committed"
        );
    }

    /// Runs a vector search over the rows visible at `query_ts`.
    ///
    /// Full chunks below the barrier are answered by their built chunk
    /// index when one exists under the request's metric; everything else is
    /// scanned exactly. Partial answers are folded chunk by chunk, rounded
    /// once, and paired with primary keys.
    ///
    /// # Errors
    ///
    /// See [`SegmentReader::search`].
    pub fn search(&self, request: &SearchRequest, query_ts: Timestamp) -> Result<SearchResult> {
        request.validate(&self.config.limits)?;
        validate_search_field(&self.schema, request)?;

        let num_queries = request.queries.num_queries();
        let barrier = self.insert_record.active_count(query_ts);
        let mask = self.delete_mask(barrier, query_ts);
        let column = self.insert_record.column(request.field_id)?;
        let queries = request.queries.as_vectors();
        let chunk_rows = self.config.column.chunk_rows;

        let mut acc = SubSearchResult::new(
            num_queries,
            request.topk,
            request.metric,
            request.round_decimal,
        );
        let mut chunk_begin = 0;
        while chunk_begin < barrier {
            let chunk_id = chunk_begin / chunk_rows;
            let rows_in_chunk = (barrier - chunk_begin).min(chunk_rows);
            let filter = block_filter(&mask, chunk_begin, rows_in_chunk);

            let indexed = (rows_in_chunk == chunk_rows)
                .then(|| self.indexing.get(&request.field_id))
                .flatten()
                .filter(|idx| idx.metric() == request.metric)
                .and_then(|idx| idx.chunk_index(chunk_id));
            let hits = match indexed {
                Some(index) => index.search(&queries, request.topk, filter.as_ref())?,
                None => {
                    match column {
                        ColumnData::FloatVector { dim, column } => {
                            let chunk = column.chunk_slice(chunk_id, rows_in_chunk);
                            scan_block(
                                request.metric,
                                &VectorsRef::Float {
                                    dim: *dim,
                                    data: chunk.as_slice(),
                                },
                                &queries,
                                request.topk,
                                filter.as_ref(),
                            )?
                        }
                        ColumnData::BinaryVector { dim, column } => {
                            let chunk = column.chunk_slice(chunk_id, rows_in_chunk);
                            scan_block(
                                request.metric,
                                &VectorsRef::Binary {
                                    dim: *dim,
                                    data: chunk.as_slice(),
                                },
                                &queries,
                                request.topk,
                                filter.as_ref(),
                            )?
                        }
                        _ => unreachable!("search field validated as a vector column"),
                    }
                }
            };
            acc.absorb(&SubSearchResult::from_hits(
                hits,
                request.metric,
                request.round_decimal,
                chunk_begin,
            ));
            chunk_begin += rows_in_chunk;
        }

        acc.round_scores();
        let offsets: Vec<Option<usize>> = (0..num_queries)
            .flat_map(|q| acc.query_offsets(q).iter().copied())
            .collect();
        let pks = collect_primary_keys(&offsets, |o| self.pk_at(o));
        tracing::debug!(
            field = %request.field_id,
            num_queries,
            topk = request.topk,
            barrier,
            "growing search finished"
        );
        Ok(SearchResult::new(acc, pks))
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
        let barrier = self.insert_record.active_count(query_ts);
        let mut rows = predicate.evaluate(barrier);
        rows.remove_range(barrier as u32..=u32::MAX);
        rows -= &*self.delete_mask(barrier, query_ts);

        let limit = request.limit.unwrap_or(usize::MAX);
        let offsets: Vec<usize> = rows.iter().take(limit).map(|o| o as usize).collect();
        let row_ids = offsets
            .iter()
            .map(|&o| self.insert_record.row_ids().value(o))
            .collect();
        let mut fields = Vec::with_capacity(request.field_ids.len());
        for &id in &request.field_ids {
            fields.push((id, self.insert_record.column(id)?.gather(&offsets)));
        }
        Ok(RetrieveResult {
            offsets,
            row_ids,
            fields,
        })
    }

    /// Rows committed and visible to readers regardless of timestamp.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.insert_record.watermark()
    }

    /// Rows committed at or before `ts`.
    #[must_use]
    pub fn active_count(&self, ts: Timestamp) -> usize {
        self.insert_record.active_count(ts)
    }

    /// Offsets of live rows carrying `pk` at `query_ts`, ascending.
    #[must_use]
    pub fn pk_offsets(&self, pk: &PrimaryKey, query_ts: Timestamp) -> Vec<usize> {
        let barrier = self.insert_record.active_count(query_ts);
        let mask = self.delete_mask(barrier, query_ts);
        let mut offsets: Vec<usize> = self
            .insert_record
            .pk_offsets_below(pk, barrier)
            .into_iter()
            .filter(|&o| !mask.contains(o as u32))
            .collect();
        offsets.sort_unstable();
        offsets
    }

    /// Estimated in-memory footprint in bytes.
    #[must_use]
    pub fn memory_usage_bytes(&self) -> usize {
        let indexes: usize = self.indexing.values().map(ChunkIndexing::memory_bytes).sum();
        self.insert_record.memory_bytes() + self.deleted_record.memory_bytes() + indexes
    }

    /// Schema the segment was constructed against.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The insert-side storage. Exposed for the delete-mask plumbing and
    /// for tests that assert on watermarks.
    #[must_use]
    pub fn insert_record(&self) -> &InsertRecord {
        &self.insert_record
    }

    /// The tombstone store.
    #[must_use]
    pub fn deleted_record(&self) -> &DeletedRecord {
        &self.deleted_record
    }

    /// Delete mask for a query: bit set = row invisible among the first
    /// `insert_barrier` rows.
    fn delete_mask(&self, insert_barrier: usize, query_ts: Timestamp) -> Arc<RoaringBitmap> {
        self.deleted_record.deleted_bitmap(
            self.deleted_record.watermark(),
            insert_barrier,
            &self.insert_record,
            query_ts,
        )
    }

    /// Primary key of a published row: the declared key field, or the row id
    /// when the schema declares none.
    fn pk_at(&self, offset: usize) -> PrimaryKey {
        match self.schema.primary_field_id() {
            Some(id) => self
                .insert_record
                .column(id)
                .expect("primary field exists in every column map")
                .primary_key_at(offset)
                .expect("primary column is Int64 or VarChar"),
            None => PrimaryKey::Int64(self.insert_record.row_ids().value(offset)),
        }
    }

    /// Primary keys of an already-sorted batch, ready for the pk index.
    fn batch_primary_keys(
        &self,
        row_ids: &[RowId],
        fields: &[(FieldId, FieldBatch)],
    ) -> Vec<PrimaryKey> {
        match self.schema.primary_field_id() {
            Some(pf) => {
                let batch = &fields
                    .iter()
                    .find(|(id, _)| *id == pf)
                    .expect("batch coverage validated above")
                    .1;
                (0..row_ids.len())
                    .map(|i| {
                        batch
                            .primary_key_at(i)
                            .expect("primary batch is Int64 or VarChar")
                    })
                    .collect()
            }
            None => row_ids.iter().map(|&id| PrimaryKey::Int64(id)).collect(),
        }
    }

    /// Catches chunk indexes up to the watermark. Build failures only cost
    /// the index; searches fall back to scanning those chunks.
    fn refresh_chunk_indexes(&self) {
        if self.indexing.is_empty() {
            return;
        }
        let watermark = self.insert_record.watermark();
        for (field, indexing) in &self.indexing {
            let column = self
                .insert_record
                .column(*field)
                .expect("indexing map is built from the schema");
            if let Err(e) = indexing.advance(column, watermark) {
                tracing::warn!(field = %field, error = %e, "chunk index build failed");
            }
        }
    }
}

impl SegmentReader for GrowingSegment {
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

/// Sort order of a timestamp batch, or `None` when it is already sorted.
fn sort_permutation(timestamps: &[Timestamp]) -> Option<Vec<usize>> {
    if timestamps.windows(2).all(|w| w[0] <= w[1]) {
        return None;
    }
    let mut order: Vec<usize> = (0..timestamps.len()).collect();
    order.sort_by_key(|&i| timestamps[i]);
    Some(order)
}

/// Restricts a segment-wide mask to one block, rebased to block-local rows.
/// Returns `None` when no row of the block is masked.
fn block_filter(mask: &RoaringBitmap, begin: usize, rows: usize) -> Option<RoaringBitmap> {
    let end = (begin + rows) as u32;
    let mut local = RoaringBitmap::new();
    for bit in mask.iter() {
        if bit >= end {
            break;
        }
        if bit >= begin as u32 {
            local.insert(bit - begin as u32);
        }
    }
    (!local.is_empty()).then_some(local)
}

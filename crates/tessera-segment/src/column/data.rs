//! Typed column values: owned batches and the closed column variant set.
//!
//! [`FieldBatch`] is the owned, contiguous form column data travels in:
//! insert payloads, sealed-segment blobs and retrieve outputs all use it.
//! [`ColumnData`] is the growing store behind one field, a tagged variant
//! over the fixed element-kind set. All dispatch is a `match` on the tag;
//! nothing downcasts.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DataType, FieldSchema, PrimaryKey};

use super::chunked::{ChunkSlice, ChunkedColumn};

/// Owned column values for a window of rows, one variant per element kind.
///
/// Vector variants carry their dimension; `data` is row-major and holds
/// `rows * dim` elements (`rows * dim / 8` bytes for binary vectors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldBatch {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    VarChar(Vec<String>),
    FloatVector { dim: usize, data: Vec<f32> },
    BinaryVector { dim: usize, data: Vec<u8> },
}

impl FieldBatch {
    /// The element kind of this batch.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::VarChar(_) => DataType::VarChar,
            Self::FloatVector { .. } => DataType::FloatVector,
            Self::BinaryVector { .. } => DataType::BinaryVector,
        }
    }

    /// Number of rows the batch holds.
    ///
    /// # Panics
    ///
    /// Panics if a vector batch has dimension 0 or a length that is not a
    /// whole number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::VarChar(v) => v.len(),
            Self::FloatVector { dim, data } => {
                assert!(*dim > 0 && data.len() % dim == 0, "ragged vector batch");
                data.len() / dim
            }
            Self::BinaryVector { dim, data } => {
                let bytes = dim / 8;
                assert!(bytes > 0 && data.len() % bytes == 0, "ragged vector batch");
                data.len() / bytes
            }
        }
    }

    /// Checks that the batch matches a field declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] or [`Error::DimensionMismatch`].
    pub fn validate_against(&self, field: &FieldSchema) -> Result<()> {
        if self.data_type() != field.data_type {
            return Err(Error::TypeMismatch {
                field: field.id,
                expected: field.data_type,
                actual: self.data_type(),
            });
        }
        let dim = match self {
            Self::FloatVector { dim, .. } | Self::BinaryVector { dim, .. } => Some(*dim),
            _ => None,
        };
        if let Some(dim) = dim {
            if dim != field.dim {
                return Err(Error::DimensionMismatch {
                    expected: field.dim,
                    actual: dim,
                });
            }
        }
        Ok(())
    }

    /// Reads row `i` as a primary key, for Int64 and VarChar batches.
    #[must_use]
    pub fn primary_key_at(&self, i: usize) -> Option<PrimaryKey> {
        match self {
            Self::Int64(v) => v.get(i).map(|pk| PrimaryKey::Int64(*pk)),
            Self::VarChar(v) => v.get(i).map(|pk| PrimaryKey::VarChar(pk.clone())),
            _ => None,
        }
    }

    /// Gathers the given rows into a new batch of the same kind.
    ///
    /// # Panics
    ///
    /// Panics if any offset is out of range.
    #[must_use]
    pub fn gather(&self, offsets: &[usize]) -> Self {
        fn pick<T: Clone>(v: &[T], offsets: &[usize]) -> Vec<T> {
            offsets.iter().map(|&i| v[i].clone()).collect()
        }
        fn pick_rows<T: Clone>(v: &[T], width: usize, offsets: &[usize]) -> Vec<T> {
            let mut out = Vec::with_capacity(offsets.len() * width);
            for &i in offsets {
                out.extend_from_slice(&v[i * width..(i + 1) * width]);
            }
            out
        }
        match self {
            Self::Bool(v) => Self::Bool(pick(v, offsets)),
            Self::Int8(v) => Self::Int8(pick(v, offsets)),
            Self::Int16(v) => Self::Int16(pick(v, offsets)),
            Self::Int32(v) => Self::Int32(pick(v, offsets)),
            Self::Int64(v) => Self::Int64(pick(v, offsets)),
            Self::Float(v) => Self::Float(pick(v, offsets)),
            Self::Double(v) => Self::Double(pick(v, offsets)),
            Self::VarChar(v) => Self::VarChar(pick(v, offsets)),
            Self::FloatVector { dim, data } => Self::FloatVector {
                dim: *dim,
                data: pick_rows(data, *dim, offsets),
            },
            Self::BinaryVector { dim, data } => Self::BinaryVector {
                dim: *dim,
                data: pick_rows(data, dim / 8, offsets),
            },
        }
    }

    /// Borrows a vector batch in the form index kernels consume; `None` for
    /// scalar batches.
    #[must_use]
    pub fn as_vectors(&self) -> Option<crate::index::VectorsRef<'_>> {
        match self {
            Self::FloatVector { dim, data } => {
                Some(crate::index::VectorsRef::Float { dim: *dim, data })
            }
            Self::BinaryVector { dim, data } => {
                Some(crate::index::VectorsRef::Binary { dim: *dim, data })
            }
            _ => None,
        }
    }

    /// Estimated heap footprint in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len() * 2,
            Self::Int32(v) => v.len() * 4,
            Self::Int64(v) => v.len() * 8,
            Self::Float(v) => v.len() * 4,
            Self::Double(v) => v.len() * 8,
            Self::VarChar(v) => v
                .iter()
                .map(|s| s.len() + std::mem::size_of::<String>())
                .sum(),
            Self::FloatVector { data, .. } => data.len() * 4,
            Self::BinaryVector { data, .. } => data.len(),
        }
    }
}

/// Growing column store behind one field: the closed variant set over
/// [`ChunkedColumn`] specializations.
///
/// Vector variants remember their dimension; `VarChar` is the only
/// variable-width member and stores owned strings per row.
#[derive(Debug)]
pub enum ColumnData {
    Bool(ChunkedColumn<bool>),
    Int8(ChunkedColumn<i8>),
    Int16(ChunkedColumn<i16>),
    Int32(ChunkedColumn<i32>),
    Int64(ChunkedColumn<i64>),
    Float(ChunkedColumn<f32>),
    Double(ChunkedColumn<f64>),
    VarChar(ChunkedColumn<String>),
    FloatVector { dim: usize, column: ChunkedColumn<f32> },
    BinaryVector { dim: usize, column: ChunkedColumn<u8> },
}

impl ColumnData {
    /// Creates the store for a field declaration.
    #[must_use]
    pub fn for_field(field: &FieldSchema, chunk_rows: usize) -> Self {
        match field.data_type {
            DataType::Bool => Self::Bool(ChunkedColumn::new(1, chunk_rows)),
            DataType::Int8 => Self::Int8(ChunkedColumn::new(1, chunk_rows)),
            DataType::Int16 => Self::Int16(ChunkedColumn::new(1, chunk_rows)),
            DataType::Int32 => Self::Int32(ChunkedColumn::new(1, chunk_rows)),
            DataType::Int64 => Self::Int64(ChunkedColumn::new(1, chunk_rows)),
            DataType::Float => Self::Float(ChunkedColumn::new(1, chunk_rows)),
            DataType::Double => Self::Double(ChunkedColumn::new(1, chunk_rows)),
            DataType::VarChar => Self::VarChar(ChunkedColumn::new(1, chunk_rows)),
            DataType::FloatVector => Self::FloatVector {
                dim: field.dim,
                column: ChunkedColumn::new(field.dim, chunk_rows),
            },
            DataType::BinaryVector => Self::BinaryVector {
                dim: field.dim,
                column: ChunkedColumn::new(field.dim / 8, chunk_rows),
            },
        }
    }

    /// The element kind stored here.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::VarChar(_) => DataType::VarChar,
            Self::FloatVector { .. } => DataType::FloatVector,
            Self::BinaryVector { .. } => DataType::BinaryVector,
        }
    }

    /// Writes a validated batch into the reserved window starting at
    /// `base_row`.
    ///
    /// # Panics
    ///
    /// Panics if the batch kind does not match the column; callers validate
    /// against the schema before any write.
    pub fn write_batch(&self, base_row: usize, batch: &FieldBatch) {
        let rows = batch.row_count();
        match (self, batch) {
            (Self::Bool(c), FieldBatch::Bool(v)) => c.write_rows(base_row, rows, v),
            (Self::Int8(c), FieldBatch::Int8(v)) => c.write_rows(base_row, rows, v),
            (Self::Int16(c), FieldBatch::Int16(v)) => c.write_rows(base_row, rows, v),
            (Self::Int32(c), FieldBatch::Int32(v)) => c.write_rows(base_row, rows, v),
            (Self::Int64(c), FieldBatch::Int64(v)) => c.write_rows(base_row, rows, v),
            (Self::Float(c), FieldBatch::Float(v)) => c.write_rows(base_row, rows, v),
            (Self::Double(c), FieldBatch::Double(v)) => c.write_rows(base_row, rows, v),
            (Self::VarChar(c), FieldBatch::VarChar(v)) => c.write_rows(base_row, rows, v),
            (Self::FloatVector { dim, column }, FieldBatch::FloatVector { dim: d, data })
                if dim == d =>
            {
                column.write_rows(base_row, rows, data);
            }
            (Self::BinaryVector { dim, column }, FieldBatch::BinaryVector { dim: d, data })
                if dim == d =>
            {
                column.write_rows(base_row, rows, data);
            }
            _ => panic!(
                "batch kind {:?} does not match column kind {:?}",
                batch.data_type(),
                self.data_type()
            ),
        }
    }

    /// Pre-allocates chunks covering `rows` rows.
    pub fn grow_to(&self, rows: usize) {
        match self {
            Self::Bool(c) => c.grow_to(rows),
            Self::Int8(c) => c.grow_to(rows),
            Self::Int16(c) => c.grow_to(rows),
            Self::Int32(c) => c.grow_to(rows),
            Self::Int64(c) => c.grow_to(rows),
            Self::Float(c) => c.grow_to(rows),
            Self::Double(c) => c.grow_to(rows),
            Self::VarChar(c) => c.grow_to(rows),
            Self::FloatVector { column, .. } => column.grow_to(rows),
            Self::BinaryVector { column, .. } => column.grow_to(rows),
        }
    }

    /// Gathers published rows into an owned batch (the bulk read behind
    /// retrieve and result filling).
    ///
    /// # Panics
    ///
    /// Panics if an offset lies outside the allocated rows; callers pass
    /// offsets below the watermark.
    #[must_use]
    pub fn gather(&self, offsets: &[usize]) -> FieldBatch {
        fn pick<T: Clone + Default + Send + Sync>(
            c: &ChunkedColumn<T>,
            offsets: &[usize],
        ) -> Vec<T> {
            offsets.iter().map(|&row| c.value(row)).collect()
        }
        fn pick_rows<T: Clone + Default + Send + Sync>(
            c: &ChunkedColumn<T>,
            offsets: &[usize],
        ) -> Vec<T> {
            let mut out = Vec::with_capacity(offsets.len() * c.elements_per_row());
            for &row in offsets {
                out.extend(c.row(row));
            }
            out
        }
        match self {
            Self::Bool(c) => FieldBatch::Bool(pick(c, offsets)),
            Self::Int8(c) => FieldBatch::Int8(pick(c, offsets)),
            Self::Int16(c) => FieldBatch::Int16(pick(c, offsets)),
            Self::Int32(c) => FieldBatch::Int32(pick(c, offsets)),
            Self::Int64(c) => FieldBatch::Int64(pick(c, offsets)),
            Self::Float(c) => FieldBatch::Float(pick(c, offsets)),
            Self::Double(c) => FieldBatch::Double(pick(c, offsets)),
            Self::VarChar(c) => FieldBatch::VarChar(pick(c, offsets)),
            Self::FloatVector { dim, column } => FieldBatch::FloatVector {
                dim: *dim,
                data: pick_rows(column, offsets),
            },
            Self::BinaryVector { dim, column } => FieldBatch::BinaryVector {
                dim: *dim,
                data: pick_rows(column, offsets),
            },
        }
    }

    /// Reads a published row as a primary key, for Int64 and VarChar columns.
    #[must_use]
    pub fn primary_key_at(&self, row: usize) -> Option<PrimaryKey> {
        match self {
            Self::Int64(c) => Some(PrimaryKey::Int64(c.value(row))),
            Self::VarChar(c) => Some(PrimaryKey::VarChar(c.value(row))),
            _ => None,
        }
    }

    /// The float-vector column and its dimension, if that is what this is.
    #[must_use]
    pub fn as_float_vector(&self) -> Option<(usize, &ChunkedColumn<f32>)> {
        match self {
            Self::FloatVector { dim, column } => Some((*dim, column)),
            _ => None,
        }
    }

    /// The binary-vector column and its dimension, if that is what this is.
    #[must_use]
    pub fn as_binary_vector(&self) -> Option<(usize, &ChunkedColumn<u8>)> {
        match self {
            Self::BinaryVector { dim, column } => Some((*dim, column)),
            _ => None,
        }
    }

    /// Lock-free view of one chunk of a float-vector column.
    #[must_use]
    pub fn float_vector_chunk(&self, chunk_id: usize, rows: usize) -> Option<ChunkSlice<f32>> {
        self.as_float_vector()
            .map(|(_, column)| column.chunk_slice(chunk_id, rows))
    }

    /// Estimated footprint of the allocated chunks in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        match self {
            Self::Bool(c) => c.memory_bytes(),
            Self::Int8(c) => c.memory_bytes(),
            Self::Int16(c) => c.memory_bytes(),
            Self::Int32(c) => c.memory_bytes(),
            Self::Int64(c) => c.memory_bytes(),
            Self::Float(c) => c.memory_bytes(),
            Self::Double(c) => c.memory_bytes(),
            Self::VarChar(c) => c.memory_bytes(),
            Self::FloatVector { column, .. } => column.memory_bytes(),
            Self::BinaryVector { column, .. } => column.memory_bytes(),
        }
    }
}

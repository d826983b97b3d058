//! Segment schema: field identities, data types and primary keys.
//!
//! The schema is read-only after segment construction. Column layout,
//! primary-key extraction and blob validation all derive from it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Logical commit time assigned by the upstream log service.
///
/// Timestamps order all mutations of a collection. Queries carry one and see
/// exactly the mutations with a timestamp less than or equal to it.
pub type Timestamp = u64;

/// Sentinel meaning "no upper bound": a query at this timestamp sees every
/// committed mutation.
pub const MAX_TIMESTAMP: Timestamp = u64::MAX;

/// Monotonic row identity assigned upstream, stored in a system column.
pub type RowId = i64;

/// Identifier of a field within a collection schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub i64);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// System field holding the row id of every row.
pub const ROW_ID_FIELD: FieldId = FieldId(0);
/// System field holding the commit timestamp of every row.
pub const TIMESTAMP_FIELD: FieldId = FieldId(1);
/// User-declared fields start at this id; lower ids are reserved.
pub const START_USER_FIELD_ID: i64 = 100;

/// Element kinds a column can hold.
///
/// The set is closed: every column in the engine is one of these, and all
/// dispatch happens over this enum rather than through type erasure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    /// Variable-width UTF-8 string. The only variable-width scalar.
    VarChar,
    /// Dense `f32` vector; dimension lives in [`FieldSchema::dim`].
    FloatVector,
    /// Packed binary vector, 8 dimensions per byte.
    BinaryVector,
}

impl DataType {
    /// Returns true for the vector family.
    #[must_use]
    pub const fn is_vector(&self) -> bool {
        matches!(self, Self::FloatVector | Self::BinaryVector)
    }

    /// Bytes of one stored element, or `None` for variable-width types.
    ///
    /// For vectors this is the per-dimension element (`f32` / packed byte),
    /// not the whole row.
    #[must_use]
    pub const fn element_bytes(&self) -> Option<usize> {
        match self {
            Self::Bool | Self::Int8 | Self::BinaryVector => Some(1),
            Self::Int16 => Some(2),
            Self::Int32 | Self::Float | Self::FloatVector => Some(4),
            Self::Int64 | Self::Double => Some(8),
            Self::VarChar => None,
        }
    }

    /// Returns true if the type may carry a primary key.
    #[must_use]
    pub const fn valid_primary_key(&self) -> bool {
        matches!(self, Self::Int64 | Self::VarChar)
    }
}

/// External identity of a row, declared by the schema's primary-key field.
///
/// Result slots that carry no hit use `Option<PrimaryKey>` rather than a
/// reserved sentinel value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimaryKey {
    Int64(i64),
    VarChar(String),
}

impl Default for PrimaryKey {
    fn default() -> Self {
        Self::Int64(0)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::VarChar(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<String> for PrimaryKey {
    fn from(v: String) -> Self {
        Self::VarChar(v)
    }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self {
        Self::VarChar(v.to_string())
    }
}

/// Declaration of one field: identity, type and vector dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field identifier, unique within the schema.
    pub id: FieldId,
    /// Human-readable name, unique within the schema.
    pub name: String,
    /// Element kind stored by the field.
    pub data_type: DataType,
    /// Vector dimension; 0 for scalars.
    pub dim: usize,
    /// Whether this field carries the collection's primary key.
    pub is_primary: bool,
}

impl FieldSchema {
    /// Declares a scalar field.
    #[must_use]
    pub fn scalar(id: FieldId, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
            dim: 0,
            is_primary: false,
        }
    }

    /// Declares a vector field of the given dimension.
    #[must_use]
    pub fn vector(id: FieldId, name: impl Into<String>, data_type: DataType, dim: usize) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
            dim,
            is_primary: false,
        }
    }

    /// Marks the field as the primary key.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Stored elements per row: 1 for scalars, `dim` for float vectors,
    /// `dim / 8` for packed binary vectors.
    #[must_use]
    pub const fn elements_per_row(&self) -> usize {
        match self.data_type {
            DataType::FloatVector => self.dim,
            DataType::BinaryVector => self.dim / 8,
            _ => 1,
        }
    }
}

/// Read-only collection schema a segment is constructed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldSchema>,
    primary: Option<FieldId>,
}

impl Schema {
    /// Builds a schema from user field declarations.
    ///
    /// System fields (row id, timestamp) are managed by the segment itself
    /// and must not appear here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if field ids collide, an id falls in the
    /// reserved range, more than one field is primary, the primary key type
    /// is not Int64/VarChar, or a vector field has an invalid dimension.
    pub fn new(fields: Vec<FieldSchema>) -> Result<Self> {
        let mut primary = None;
        for (i, field) in fields.iter().enumerate() {
            if field.id.0 < START_USER_FIELD_ID {
                return Err(Error::Config(format!(
                    "field {} uses reserved id {}",
                    field.name, field.id
                )));
            }
            if fields[..i].iter().any(|f| f.id == field.id) {
                return Err(Error::Config(format!("duplicate field id {}", field.id)));
            }
            match field.data_type {
                DataType::FloatVector if field.dim == 0 => {
                    return Err(Error::Config(format!(
                        "vector field {} has dimension 0",
                        field.name
                    )));
                }
                DataType::BinaryVector if field.dim == 0 || field.dim % 8 != 0 => {
                    return Err(Error::Config(format!(
                        "binary vector field {} needs a dimension that is a positive multiple of 8, got {}",
                        field.name, field.dim
                    )));
                }
                _ => {}
            }
            if field.is_primary {
                if primary.is_some() {
                    return Err(Error::Config("multiple primary key fields".into()));
                }
                if !field.data_type.valid_primary_key() {
                    return Err(Error::Config(format!(
                        "primary key field {} must be Int64 or VarChar",
                        field.name
                    )));
                }
                primary = Some(field.id);
            }
        }
        Ok(Self { fields, primary })
    }

    /// All user fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Looks up a field by id.
    pub fn field(&self, id: FieldId) -> Result<&FieldSchema> {
        self.fields
            .iter()
            .find(|f| f.id == id)
            .ok_or(Error::FieldNotFound(id))
    }

    /// The primary-key field, if the schema declares one.
    #[must_use]
    pub fn primary_field(&self) -> Option<&FieldSchema> {
        self.primary.and_then(|id| self.fields.iter().find(|f| f.id == id))
    }

    /// Id of the primary-key field.
    #[must_use]
    pub fn primary_field_id(&self) -> Option<FieldId> {
        self.primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_field_schema() -> Vec<FieldSchema> {
        vec![
            FieldSchema::scalar(FieldId(100), "id", DataType::Int64).primary(),
            FieldSchema::vector(FieldId(101), "embedding", DataType::FloatVector, 4),
        ]
    }

    #[test]
    fn schema_resolves_fields_and_primary() {
        let schema = Schema::new(two_field_schema()).unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.field(FieldId(101)).unwrap().dim, 4);
        assert_eq!(schema.primary_field_id(), Some(FieldId(100)));
        assert!(matches!(
            schema.field(FieldId(999)),
            Err(Error::FieldNotFound(_))
        ));
    }

    #[test]
    fn schema_rejects_reserved_and_duplicate_ids() {
        let reserved = vec![FieldSchema::scalar(FieldId(1), "ts", DataType::Int64)];
        assert!(Schema::new(reserved).is_err());

        let dup = vec![
            FieldSchema::scalar(FieldId(100), "a", DataType::Int64),
            FieldSchema::scalar(FieldId(100), "b", DataType::Int32),
        ];
        assert!(Schema::new(dup).is_err());
    }

    #[test]
    fn schema_rejects_bad_primary_and_bad_dims() {
        let float_pk = vec![FieldSchema::scalar(FieldId(100), "x", DataType::Float).primary()];
        assert!(Schema::new(float_pk).is_err());

        let zero_dim = vec![FieldSchema::vector(
            FieldId(100),
            "v",
            DataType::FloatVector,
            0,
        )];
        assert!(Schema::new(zero_dim).is_err());

        let bad_binary = vec![FieldSchema::vector(
            FieldId(100),
            "b",
            DataType::BinaryVector,
            12,
        )];
        assert!(Schema::new(bad_binary).is_err());
    }

    #[test]
    fn elements_per_row_accounts_for_packing() {
        let float = FieldSchema::vector(FieldId(100), "v", DataType::FloatVector, 128);
        assert_eq!(float.elements_per_row(), 128);

        let binary = FieldSchema::vector(FieldId(101), "b", DataType::BinaryVector, 128);
        assert_eq!(binary.elements_per_row(), 16);

        let scalar = FieldSchema::scalar(FieldId(102), "s", DataType::Int32);
        assert_eq!(scalar.elements_per_row(), 1);
    }

    #[test]
    fn primary_key_ordering_and_conversions() {
        let a = PrimaryKey::from(1i64);
        let b = PrimaryKey::from(2i64);
        assert!(a < b);
        assert_eq!(PrimaryKey::from("abc"), PrimaryKey::VarChar("abc".into()));
        assert_eq!(format!("{}", PrimaryKey::from(7i64)), "7");
    }
}

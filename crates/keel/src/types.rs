//! Mapping between Postgres column types and semantic types.
//!
//! A [`SemanticType`] is what a column *holds*, independent of how the
//! database spells it: `int4`, `integer` and `INTEGER` are all
//! [`SemanticType::Int32`]. Comparisons in [`crate::diff`] happen on semantic
//! types, and [`semantic_to_ddl`] turns them back into a Postgres type.

use crate::schema::ColumnDescriptor;
use crate::{Error, Result};
use std::fmt;

/// Length used for text columns that declare none.
pub const DEFAULT_TEXT_LENGTH: u32 = 255;

/// Precision used for decimal columns that declare none.
pub const DEFAULT_DECIMAL_PRECISION: u32 = 18;

/// Scale used for decimal columns that declare none.
pub const DEFAULT_DECIMAL_SCALE: u32 = 2;

/// The kind of value a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    /// 2-byte signed integer
    Int16,
    /// 4-byte signed integer
    Int32,
    /// 8-byte signed integer
    Int64,
    /// 8-byte unsigned integer (no Postgres counterpart)
    UInt64,
    /// 4-byte float
    Float32,
    /// 8-byte float
    Float64,
    /// Exact numeric with precision and scale
    Decimal,
    Boolean,
    /// Character data, optionally length-limited
    Text,
    /// Timestamp without time zone
    DateTime,
    /// Timestamp with time zone
    DateTimeOffset,
    Date,
    Time,
    Uuid,
    Binary,
    Json,
}

impl SemanticType {
    pub const ALL: [SemanticType; 16] = [
        SemanticType::Int16,
        SemanticType::Int32,
        SemanticType::Int64,
        SemanticType::UInt64,
        SemanticType::Float32,
        SemanticType::Float64,
        SemanticType::Decimal,
        SemanticType::Boolean,
        SemanticType::Text,
        SemanticType::DateTime,
        SemanticType::DateTimeOffset,
        SemanticType::Date,
        SemanticType::Time,
        SemanticType::Uuid,
        SemanticType::Binary,
        SemanticType::Json,
    ];

    /// The name used for this type in model files.
    pub fn name(self) -> &'static str {
        match self {
            SemanticType::Int16 => "int16",
            SemanticType::Int32 => "int32",
            SemanticType::Int64 => "int64",
            SemanticType::UInt64 => "uint64",
            SemanticType::Float32 => "float32",
            SemanticType::Float64 => "float64",
            SemanticType::Decimal => "decimal",
            SemanticType::Boolean => "bool",
            SemanticType::Text => "text",
            SemanticType::DateTime => "datetime",
            SemanticType::DateTimeOffset => "datetimeoffset",
            SemanticType::Date => "date",
            SemanticType::Time => "time",
            SemanticType::Uuid => "uuid",
            SemanticType::Binary => "binary",
            SemanticType::Json => "json",
        }
    }

    /// Parse a model-file type name (case-insensitive).
    ///
    /// Accepts the names returned by [`SemanticType::name`] plus the Rust
    /// spellings of the same types (`i32`, `String`, `Vec<u8>`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let ty = match lower.as_str() {
            "int16" | "i16" => SemanticType::Int16,
            "int32" | "i32" => SemanticType::Int32,
            "int64" | "i64" => SemanticType::Int64,
            "uint64" | "u64" => SemanticType::UInt64,
            "float32" | "f32" => SemanticType::Float32,
            "float64" | "f64" => SemanticType::Float64,
            "decimal" => SemanticType::Decimal,
            "bool" | "boolean" => SemanticType::Boolean,
            "text" | "string" => SemanticType::Text,
            "datetime" | "naivedatetime" => SemanticType::DateTime,
            "datetimeoffset" | "timestamp" => SemanticType::DateTimeOffset,
            "date" => SemanticType::Date,
            "time" => SemanticType::Time,
            "uuid" => SemanticType::Uuid,
            "binary" | "bytes" | "vec<u8>" => SemanticType::Binary,
            "json" => SemanticType::Json,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a native Postgres type name, as reported by
/// `information_schema.columns.data_type`, to its semantic type.
///
/// Short aliases (`int4`, `varchar`, `timestamptz`, ...) are accepted too.
/// An unknown name is an error: skipping the column would make the diff
/// believe it does not exist and schedule it for re-creation.
pub fn native_to_semantic(native: &str) -> Result<SemanticType> {
    let lower = native.trim().to_ascii_lowercase();
    let ty = match lower.as_str() {
        "smallint" | "int2" => SemanticType::Int16,
        "integer" | "int" | "int4" => SemanticType::Int32,
        "bigint" | "int8" => SemanticType::Int64,
        "real" | "float4" => SemanticType::Float32,
        "double precision" | "float8" => SemanticType::Float64,
        "numeric" | "decimal" => SemanticType::Decimal,
        "boolean" | "bool" => SemanticType::Boolean,
        "text" | "character varying" | "varchar" | "character" | "char" | "bpchar" => {
            SemanticType::Text
        }
        "timestamp without time zone" | "timestamp" => SemanticType::DateTime,
        "timestamp with time zone" | "timestamptz" => SemanticType::DateTimeOffset,
        "date" => SemanticType::Date,
        "time without time zone" | "time" => SemanticType::Time,
        "uuid" => SemanticType::Uuid,
        "bytea" => SemanticType::Binary,
        "json" | "jsonb" => SemanticType::Json,
        _ => {
            return Err(Error::UnsupportedNativeType {
                native: native.to_string(),
                column: None,
            });
        }
    };
    Ok(ty)
}

/// Render the Postgres type for a column of the given semantic type.
///
/// `column.raw_type_override` wins when present. Otherwise text becomes
/// `varchar(n)` and decimal becomes `numeric(p, s)`, with the defaults
/// [`DEFAULT_TEXT_LENGTH`], [`DEFAULT_DECIMAL_PRECISION`] and
/// [`DEFAULT_DECIMAL_SCALE`] filling in what the column leaves unset.
pub fn semantic_to_ddl(semantic: SemanticType, column: &ColumnDescriptor) -> Result<String> {
    if let Some(raw) = &column.raw_type_override {
        return Ok(raw.clone());
    }

    let ddl = match semantic {
        SemanticType::Int16 => "smallint".to_string(),
        SemanticType::Int32 => "integer".to_string(),
        SemanticType::Int64 => "bigint".to_string(),
        SemanticType::Float32 => "real".to_string(),
        SemanticType::Float64 => "double precision".to_string(),
        SemanticType::Decimal => format!(
            "numeric({}, {})",
            column.precision.unwrap_or(DEFAULT_DECIMAL_PRECISION),
            column.scale.unwrap_or(DEFAULT_DECIMAL_SCALE)
        ),
        SemanticType::Boolean => "boolean".to_string(),
        SemanticType::Text => format!(
            "varchar({})",
            column.max_length.unwrap_or(DEFAULT_TEXT_LENGTH)
        ),
        SemanticType::DateTime => "timestamp".to_string(),
        SemanticType::DateTimeOffset => "timestamptz".to_string(),
        SemanticType::Date => "date".to_string(),
        SemanticType::Time => "time".to_string(),
        SemanticType::Uuid => "uuid".to_string(),
        SemanticType::Binary => "bytea".to_string(),
        SemanticType::Json => "jsonb".to_string(),
        SemanticType::UInt64 => {
            return Err(Error::UnsupportedSemanticType {
                semantic,
                column: column.name.clone(),
            });
        }
    };
    Ok(ddl)
}

/// Whether changing a column from `from` to `to` loses nothing.
///
/// One-directional: `int32 -> int64` is safe,
/// `int64 -> int32` is not. A pair listed here is not reported as a type
/// change by the diff.
pub fn is_safe_widening(from: SemanticType, to: SemanticType) -> bool {
    use SemanticType::*;

    matches!(
        (from, to),
        (Int32, Int64)
            | (Int32, Decimal)
            | (Float32, Float64)
            | (Int16, Int32)
            | (Int16, Int64)
            | (DateTime, DateTimeOffset)
            // Length changes are compared separately.
            | (Text, Text)
    )
}

/// The length a text column ends up with once created.
///
/// Columns with a raw type override keep whatever length they declare, since
/// the override is emitted verbatim. Non-text columns have no length.
pub fn effective_max_length(
    semantic: SemanticType,
    max_length: Option<u32>,
    raw_type_override: Option<&str>,
) -> Option<u32> {
    match (semantic, raw_type_override) {
        (SemanticType::Text, None) => Some(max_length.unwrap_or(DEFAULT_TEXT_LENGTH)),
        (SemanticType::Text, Some(_)) => max_length,
        _ => None,
    }
}

/// The precision and scale a decimal column ends up with once created.
pub fn effective_precision_scale(
    semantic: SemanticType,
    precision: Option<u32>,
    scale: Option<u32>,
    raw_type_override: Option<&str>,
) -> (Option<u32>, Option<u32>) {
    match (semantic, raw_type_override) {
        (SemanticType::Decimal, None) => (
            Some(precision.unwrap_or(DEFAULT_DECIMAL_PRECISION)),
            Some(scale.unwrap_or(DEFAULT_DECIMAL_SCALE)),
        ),
        (SemanticType::Decimal, Some(_)) => (precision, scale),
        _ => (None, None),
    }
}

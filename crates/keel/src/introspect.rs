//! Reading the live schema out of the Postgres catalog.

use crate::connector::Connector;
use crate::schema::{
    ColumnDescriptor, GenerationPolicy, KeyObject, Schema, TableDescriptor, fold_ident,
};
use crate::types::{SemanticType, native_to_semantic};
use crate::{Error, Result};
use indexmap::IndexMap;

/// Marker token for database-assigned columns (identity or serial).
pub const IDENTITY_TOKEN: &str = "identity";

/// Marker token for generated (computed) columns.
pub const COMPUTED_TOKEN: &str = "generated";

/// One row per column of every base table in the current schema.
///
/// `column_key` is `PRI` for primary key members, `UNI` for columns covered
/// by a single-column unique index, and empty otherwise. `key_name` names the
/// index behind that marker, and `key_is_constraint` tells whether it belongs
/// to a table constraint or stands on its own. `extra` holds the generation
/// markers, space separated.
pub const CATALOG_QUERY: &str = r#"
SELECT
    c.table_name::text AS table_name,
    c.column_name::text AS column_name,
    c.data_type::text AS native_type,
    (c.is_nullable = 'YES') AS is_nullable,
    c.character_maximum_length::int4 AS max_length,
    c.numeric_precision::int4 AS numeric_precision,
    c.numeric_scale::int4 AS numeric_scale,
    c.column_default::text AS default_value,
    c.collation_name::text AS collation,
    COALESCE(k.column_key, '') AS column_key,
    k.key_name AS key_name,
    COALESCE(k.key_is_constraint, false) AS key_is_constraint,
    CONCAT_WS(' ',
        CASE WHEN c.is_identity = 'YES' THEN 'identity' END,
        CASE WHEN c.column_default LIKE 'nextval(%' THEN 'identity' END,
        CASE WHEN c.is_generated = 'ALWAYS' THEN 'generated' END
    ) AS extra
FROM information_schema.columns c
JOIN information_schema.tables t
    ON t.table_schema = c.table_schema
    AND t.table_name = c.table_name
    AND t.table_type = 'BASE TABLE'
LEFT JOIN LATERAL (
    SELECT
        CASE WHEN i.indisprimary THEN 'PRI' ELSE 'UNI' END AS column_key,
        ic.relname::text AS key_name,
        EXISTS (
            SELECT 1 FROM pg_constraint con
            WHERE con.conindid = i.indexrelid AND con.contype IN ('p', 'u')
        ) AS key_is_constraint
    FROM pg_index i
    JOIN pg_class tc ON tc.oid = i.indrelid
    JOIN pg_class ic ON ic.oid = i.indexrelid
    JOIN pg_namespace n ON n.oid = tc.relnamespace
    JOIN pg_attribute a ON a.attrelid = tc.oid AND a.attnum = ANY(i.indkey)
    WHERE n.nspname = c.table_schema
        AND tc.relname = c.table_name
        AND a.attname = c.column_name
        AND (i.indisprimary
            OR (i.indisunique AND i.indnkeyatts = 1 AND i.indpred IS NULL))
    ORDER BY i.indisprimary DESC, ic.relname
    LIMIT 1
) k ON true
WHERE c.table_schema = current_schema()
ORDER BY c.table_name, c.ordinal_position
"#;

/// A row of [`CATALOG_QUERY`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogRow {
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub native_type: String,
    pub is_nullable: bool,
    pub max_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub default_value: Option<String>,
    pub collation: Option<String>,
    /// Key classification: `PRI`, `UNI` or empty
    pub column_key: String,
    /// Index behind `column_key`
    pub key_name: Option<String>,
    /// Whether `key_name` belongs to a constraint rather than a bare index
    pub key_is_constraint: bool,
    /// Generation markers
    pub extra: String,
}

/// Key classification of a catalog column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Primary,
    Unique,
    None,
}

impl KeyKind {
    pub fn from_marker(marker: &str) -> Self {
        match marker.trim().to_ascii_uppercase().as_str() {
            "PRI" => KeyKind::Primary,
            "UNI" => KeyKind::Unique,
            _ => KeyKind::None,
        }
    }
}

/// Read the live schema through `connector`.
///
/// Opens the connection first if needed. The connection stays open so the
/// same connector can execute DDL afterwards.
pub async fn read_live_schema<C: Connector + ?Sized>(connector: &mut C) -> Result<Schema> {
    connector
        .open_connection()
        .await
        .map_err(Error::Connectivity)?;

    let rows = connector.query_catalog().await.map_err(Error::Catalog)?;
    tracing::debug!(rows = rows.len(), "read catalog");

    schema_from_catalog(rows)
}

/// Group catalog rows into tables, keeping the order in which tables and
/// columns first appear.
pub fn schema_from_catalog(rows: impl IntoIterator<Item = CatalogRow>) -> Result<Schema> {
    let mut tables: IndexMap<String, (String, Vec<ColumnDescriptor>)> = IndexMap::new();

    for row in rows {
        let (Some(table), Some(column)) = (&row.table_name, &row.column_name) else {
            continue;
        };
        if table.is_empty() || column.is_empty() {
            continue;
        }

        let table = table.clone();
        let descriptor = column_from_row(&table, row)?;
        tables
            .entry(fold_ident(&table))
            .or_insert_with(|| (table, Vec::new()))
            .1
            .push(descriptor);
    }

    let mut schema = Schema::new();
    for (_, (name, columns)) in tables {
        schema.insert(TableDescriptor::new(name, columns)?)?;
    }
    Ok(schema)
}

fn column_from_row(table: &str, row: CatalogRow) -> Result<ColumnDescriptor> {
    let name = row.column_name.unwrap_or_default();
    let semantic_type = native_to_semantic(&row.native_type).map_err(|e| match e {
        Error::UnsupportedNativeType { native, .. } => Error::UnsupportedNativeType {
            native,
            column: Some(format!("{}.{}", table, name)),
        },
        other => other,
    })?;

    let key = KeyKind::from_marker(&row.column_key);
    let markers: Vec<String> = row
        .extra
        .split_whitespace()
        .map(|m| m.to_ascii_lowercase())
        .collect();
    let identity = markers.iter().any(|m| m == IDENTITY_TOKEN);
    let computed = markers.iter().any(|m| m == COMPUTED_TOKEN);

    let generation = if identity {
        GenerationPolicy::Identity
    } else if computed {
        GenerationPolicy::Computed
    } else {
        GenerationPolicy::None
    };

    // A serial column's nextval() default is how it auto-increments, not a
    // default the model would declare.
    let default_value = row
        .default_value
        .filter(|d| !d.trim_start().to_ascii_lowercase().starts_with("nextval("))
        .map(|d| strip_cast(&d).to_string());

    let as_u32 = |v: Option<i32>| v.and_then(|v| u32::try_from(v).ok());

    let key_object = match (key, row.key_name) {
        (KeyKind::None, _) | (_, None) => None,
        (_, Some(name)) if row.key_is_constraint => Some(KeyObject::Constraint(name)),
        (_, Some(name)) => Some(KeyObject::Index(name)),
    };

    Ok(ColumnDescriptor {
        name,
        semantic_type,
        is_nullable: row.is_nullable,
        is_primary_key: key == KeyKind::Primary,
        is_auto_increment: identity,
        max_length: match semantic_type {
            SemanticType::Text => as_u32(row.max_length),
            _ => None,
        },
        raw_type_override: None,
        default_value,
        is_unique: key == KeyKind::Unique,
        collation: row.collation,
        precision: match semantic_type {
            SemanticType::Decimal => as_u32(row.numeric_precision),
            _ => None,
        },
        scale: match semantic_type {
            SemanticType::Decimal => as_u32(row.numeric_scale),
            _ => None,
        },
        generation,
        computed_expression: None,
        key_object,
    })
}

/// Strip a trailing `::type` cast, as Postgres reports literal defaults:
/// `'abc'::character varying` becomes `'abc'`.
fn strip_cast(value: &str) -> &str {
    let bytes = value.as_bytes();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quotes = !in_quotes,
            b'(' if !in_quotes => depth += 1,
            b')' if !in_quotes => depth = depth.saturating_sub(1),
            b':' if !in_quotes && depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                return value[..i].trim_end();
            }
            _ => {}
        }
        i += 1;
    }
    value
}

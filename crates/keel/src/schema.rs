//! Table and column descriptors.
//!
//! Descriptors are the common currency of the crate: [`crate::introspect`]
//! builds them from the live catalog, [`crate::model`] builds them from the
//! declared model, and [`crate::diff`] compares the two without caring where
//! they came from.

use crate::types::SemanticType;
use crate::{Error, Result};
use indexmap::IndexMap;

/// How a column's value is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationPolicy {
    /// Supplied by the client.
    #[default]
    None,
    /// Assigned by the database on insert.
    Identity,
    /// Derived from an expression over the row.
    Computed,
}

/// The database object that makes a live column a key or unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyObject {
    /// A primary key or unique table constraint
    Constraint(String),
    /// A unique index created on its own
    Index(String),
}

/// A single column, either as it exists or as it should exist.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,
    /// What the column holds
    pub semantic_type: SemanticType,
    /// Whether the column allows NULL
    pub is_nullable: bool,
    /// Whether the column is part of the primary key
    pub is_primary_key: bool,
    /// Whether the database assigns the value on insert
    pub is_auto_increment: bool,
    /// Character length limit (text columns)
    pub max_length: Option<u32>,
    /// Explicit DDL type, emitted verbatim instead of the mapped type
    pub raw_type_override: Option<String>,
    /// Default value expression, unnormalized
    pub default_value: Option<String>,
    /// Whether the column alone carries a unique constraint
    pub is_unique: bool,
    /// Collation name
    pub collation: Option<String>,
    /// Numeric precision (decimal columns)
    pub precision: Option<u32>,
    /// Numeric scale (decimal columns)
    pub scale: Option<u32>,
    /// How the value is produced
    pub generation: GenerationPolicy,
    /// Expression for computed columns
    pub computed_expression: Option<String>,
    /// Constraint or index behind `is_primary_key` / `is_unique`, as found
    /// in the catalog. Always `None` for desired columns.
    pub key_object: Option<KeyObject>,
}

impl ColumnDescriptor {
    /// A nullable, client-supplied column with no constraints.
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            is_nullable: true,
            is_primary_key: false,
            is_auto_increment: false,
            max_length: None,
            raw_type_override: None,
            default_value: None,
            is_unique: false,
            collation: None,
            precision: None,
            scale: None,
            generation: GenerationPolicy::None,
            computed_expression: None,
            key_object: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Mark as primary key. Primary key columns are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    /// Mark as database-assigned on insert.
    pub fn identity(mut self) -> Self {
        self.is_auto_increment = true;
        self.generation = GenerationPolicy::Identity;
        self
    }

    pub fn computed(mut self, expression: impl Into<String>) -> Self {
        self.generation = GenerationPolicy::Computed;
        self.computed_expression = Some(expression.into());
        self
    }

    pub fn max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    pub fn raw_type(mut self, ddl_type: impl Into<String>) -> Self {
        self.raw_type_override = Some(ddl_type.into());
        self
    }
}

/// A table and its columns, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    /// Table name
    pub name: String,
    /// Columns
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Build a table, rejecting column names that collide case-insensitively.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Result<Self> {
        let name = name.into();
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| ident_eq(&c.name, &column.name)) {
                return Err(Error::DuplicateName {
                    kind: "column",
                    name: format!("{}.{}", name, column.name),
                });
            }
        }
        Ok(Self { name, columns })
    }

    /// Find a column by name, ignoring case.
    pub fn find_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| ident_eq(&c.name, name))
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    /// Name of the live primary key constraint, if the catalog reported one.
    pub fn primary_key_constraint(&self) -> Option<&str> {
        self.primary_key_columns()
            .find_map(|c| match &c.key_object {
                Some(KeyObject::Constraint(name)) => Some(name.as_str()),
                _ => None,
            })
    }
}

/// An ordered set of tables, keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    tables: IndexMap<String, TableDescriptor>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: impl IntoIterator<Item = TableDescriptor>) -> Result<Self> {
        let mut schema = Self::new();
        for table in tables {
            schema.insert(table)?;
        }
        Ok(schema)
    }

    /// Add a table at the end. Fails if a table of the same name (ignoring
    /// case) is already present.
    pub fn insert(&mut self, table: TableDescriptor) -> Result<()> {
        let key = fold_ident(&table.name);
        if self.tables.contains_key(&key) {
            return Err(Error::DuplicateName {
                kind: "table",
                name: table.name,
            });
        }
        self.tables.insert(key, table);
        Ok(())
    }

    /// Get a table by name, ignoring case.
    pub fn get_table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(&fold_ident(name))
    }

    /// Iterate over all tables in insertion order.
    pub fn iter_tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Case-fold an identifier for comparison.
pub fn fold_ident(name: &str) -> String {
    name.to_lowercase()
}

/// Compare two identifiers, ignoring case.
pub fn ident_eq(a: &str, b: &str) -> bool {
    a == b || fold_ident(a) == fold_ident(b)
}

//! Schema diffing: compare the live schema with the desired one.
//!
//! Only columns are ever removed. A table that exists in the database but not
//! in the model is left alone.
//!
//! Names are matched ignoring case, but differences against an existing table
//! carry the live spelling of its table and column names: that is what DDL
//! has to address.

use crate::schema::{ColumnDescriptor, Schema, TableDescriptor, ident_eq};
use crate::types::is_safe_widening;

/// A single column-level change.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaDifference {
    /// Column present in the model but not in the database.
    AddColumn {
        table: String,
        column: ColumnDescriptor,
    },
    /// Column present in both, with differing attributes.
    ModifyColumn {
        table: String,
        old: ColumnDescriptor,
        new: ColumnDescriptor,
    },
    /// Column present in the database but not in the model.
    RemoveColumn {
        table: String,
        column: ColumnDescriptor,
    },
}

impl SchemaDifference {
    pub fn table_name(&self) -> &str {
        match self {
            SchemaDifference::AddColumn { table, .. }
            | SchemaDifference::ModifyColumn { table, .. }
            | SchemaDifference::RemoveColumn { table, .. } => table,
        }
    }
}

impl std::fmt::Display for SchemaDifference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaDifference::AddColumn { column, .. } => {
                let nullable = if column.is_nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", column.name, column.semantic_type, nullable)
            }
            SchemaDifference::ModifyColumn { old, new, .. } => {
                write!(f, "~ {}:", new.name)?;
                for change in column_changes(old, new) {
                    write!(f, " {}", change)?;
                }
                Ok(())
            }
            SchemaDifference::RemoveColumn { column, .. } => write!(f, "- {}", column.name),
        }
    }
}

/// A primary key that has to be replaced as a whole on an existing table.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChange {
    /// Live table name
    pub table: String,
    /// Live key constraint, when the catalog reported its name
    pub constraint: Option<String>,
    /// Columns of the live key
    pub old_columns: Vec<String>,
    /// Columns of the desired key, spelled as in the live table where they
    /// already exist
    pub new_columns: Vec<String>,
}

/// The result of comparing two schemas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    /// Column-level changes, grouped by desired table order
    pub differences: Vec<SchemaDifference>,
    /// Tables that do not exist yet and will be created whole
    pub new_tables: Vec<TableDescriptor>,
    /// Existing tables whose primary key changes
    pub key_changes: Vec<KeyChange>,
}

impl SchemaDiff {
    /// Returns true if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }

    /// Number of column-level changes.
    pub fn len(&self) -> usize {
        self.differences.len()
    }

    /// Whether `table` was recorded as newly created.
    pub fn is_new_table(&self, table: &str) -> bool {
        self.new_tables.iter().any(|t| ident_eq(&t.name, table))
    }
}

impl std::fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No changes detected.");
        }

        writeln!(f, "Changes detected:\n")?;
        let mut current: Option<&str> = None;
        for difference in &self.differences {
            let table = difference.table_name();
            if current != Some(table) {
                if self.is_new_table(table) {
                    writeln!(f, "  {} (new table):", table)?;
                } else {
                    writeln!(f, "  {}:", table)?;
                }
                current = Some(table);
            }
            writeln!(f, "    {}", difference)?;
        }
        Ok(())
    }
}

impl Schema {
    /// Compute the changes needed to turn `live` into `self`.
    pub fn diff(&self, live: &Schema) -> SchemaDiff {
        compare(live, self)
    }
}

/// Compare the live schema with the desired schema.
///
/// Differences come out grouped per desired table, in desired order: adds and
/// modifications in desired column order, then removals in live column order.
pub fn compare(live: &Schema, desired: &Schema) -> SchemaDiff {
    let mut diff = SchemaDiff::default();

    for desired_table in desired.iter_tables() {
        let Some(live_table) = live.get_table(&desired_table.name) else {
            for column in &desired_table.columns {
                diff.differences.push(SchemaDifference::AddColumn {
                    table: desired_table.name.clone(),
                    column: column.clone(),
                });
            }
            diff.new_tables.push(desired_table.clone());
            continue;
        };

        for column in &desired_table.columns {
            match live_table.find_column(&column.name) {
                None => diff.differences.push(SchemaDifference::AddColumn {
                    table: live_table.name.clone(),
                    column: column.clone(),
                }),
                Some(existing) if has_column_changed(existing, column) => {
                    diff.differences.push(SchemaDifference::ModifyColumn {
                        table: live_table.name.clone(),
                        old: existing.clone(),
                        new: column.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        for column in &live_table.columns {
            if desired_table.find_column(&column.name).is_none() {
                diff.differences.push(SchemaDifference::RemoveColumn {
                    table: live_table.name.clone(),
                    column: column.clone(),
                });
            }
        }

        if let Some(change) = key_change(live_table, desired_table) {
            diff.key_changes.push(change);
        }
    }

    diff
}

/// The primary key replacement needed on `live`, if its key columns are not
/// the desired ones. Column order within the key is not compared.
fn key_change(live: &TableDescriptor, desired: &TableDescriptor) -> Option<KeyChange> {
    let old: Vec<&ColumnDescriptor> = live.primary_key_columns().collect();
    let new: Vec<&ColumnDescriptor> = desired.primary_key_columns().collect();

    let same = old.len() == new.len()
        && new
            .iter()
            .all(|n| old.iter().any(|o| ident_eq(&o.name, &n.name)));
    if same {
        return None;
    }

    Some(KeyChange {
        table: live.name.clone(),
        constraint: live.primary_key_constraint().map(str::to_string),
        old_columns: old.iter().map(|c| c.name.clone()).collect(),
        new_columns: new
            .iter()
            .map(|c| live.find_column(&c.name).unwrap_or(*c).name.clone())
            .collect(),
    })
}

/// Whether the live column `old` needs altering to match `new`.
pub fn has_column_changed(old: &ColumnDescriptor, new: &ColumnDescriptor) -> bool {
    !column_changes(old, new).is_empty()
}

/// Compare two default expressions after normalization.
///
/// Surrounding quotes are ignored, as is case, and the various spellings of
/// "now" all compare equal.
pub fn compare_default_values(live: Option<&str>, desired: Option<&str>) -> bool {
    match (live, desired) {
        (None, None) => true,
        (Some(a), Some(b)) => normalize_default(a).eq_ignore_ascii_case(&normalize_default(b)),
        _ => false,
    }
}

fn normalize_default(value: &str) -> String {
    let trimmed = value.trim().trim_matches(|c| c == '\'' || c == '"');
    match trimmed.to_ascii_uppercase().as_str() {
        "CURRENT_TIMESTAMP" | "CURRENT_DATE" | "NOW()" => "CURRENT_TIMESTAMP".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Short descriptions of what differs between two versions of a column.
fn column_changes(old: &ColumnDescriptor, new: &ColumnDescriptor) -> Vec<String> {
    let mut changes = Vec::new();

    if !ident_eq(&old.name, &new.name) {
        changes.push(format!("name {} -> {}", old.name, new.name));
    }
    if old.semantic_type != new.semantic_type
        && !is_safe_widening(old.semantic_type, new.semantic_type)
    {
        changes.push(format!("{} -> {}", old.semantic_type, new.semantic_type));
    }
    if old.is_nullable != new.is_nullable {
        changes.push(format!(
            "{} -> {}",
            nullability(old.is_nullable),
            nullability(new.is_nullable)
        ));
    }
    if old.is_primary_key != new.is_primary_key {
        changes.push(flag("primary key", new.is_primary_key));
    }
    if old.is_auto_increment != new.is_auto_increment {
        changes.push(flag("identity", new.is_auto_increment));
    }
    if old.max_length != new.max_length {
        changes.push(format!(
            "length {} -> {}",
            opt(&old.max_length),
            opt(&new.max_length)
        ));
    }
    if old.is_unique != new.is_unique {
        changes.push(flag("unique", new.is_unique));
    }
    if old.precision != new.precision || old.scale != new.scale {
        changes.push(format!(
            "precision ({}, {}) -> ({}, {})",
            opt(&old.precision),
            opt(&old.scale),
            opt(&new.precision),
            opt(&new.scale)
        ));
    }
    let same_collation = match (&old.collation, &new.collation) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (a, b) => a == b,
    };
    if !same_collation {
        changes.push(format!(
            "collation {} -> {}",
            opt(&old.collation),
            opt(&new.collation)
        ));
    }
    if !compare_default_values(old.default_value.as_deref(), new.default_value.as_deref()) {
        changes.push(format!(
            "default {} -> {}",
            opt(&old.default_value),
            opt(&new.default_value)
        ));
    }

    changes
}

fn nullability(nullable: bool) -> &'static str {
    if nullable { "nullable" } else { "not null" }
}

fn flag(what: &str, on: bool) -> String {
    if on {
        format!("+{}", what)
    } else {
        format!("-{}", what)
    }
}

fn opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "(none)".to_string())
}

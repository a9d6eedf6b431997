//! DDL generation.
//!
//! Every identifier is quoted, so reserved words (`user`, `order`) and mixed
//! case names (`Temp`) survive as declared.

use crate::diff::{KeyChange, SchemaDiff, SchemaDifference};
use crate::schema::{ColumnDescriptor, GenerationPolicy, KeyObject, Schema, TableDescriptor};
use crate::types::semantic_to_ddl;
use crate::Result;

/// Clause that makes the database assign a column's value.
pub const IDENTITY_CLAUSE: &str = "GENERATED BY DEFAULT AS IDENTITY";

/// Expression used for computed columns that do not carry one.
pub const COMPUTED_PLACEHOLDER: &str = "NULL";

/// Quote a Postgres identifier, doubling any embedded quotes.
///
/// ```
/// assert_eq!(keel::quote_ident("order"), "\"order\"");
/// assert_eq!(keel::quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generate a CREATE TABLE statement.
///
/// Columns flagged primary key are gathered into a trailing
/// `PRIMARY KEY (...)` clause, omitted when there are none.
pub fn create_table_statement(table: &TableDescriptor) -> Result<String> {
    let mut parts = Vec::with_capacity(table.columns.len() + 1);
    for column in &table.columns {
        parts.push(format!("    {}", column_definition(column)?));
    }

    let pk: Vec<String> = table
        .primary_key_columns()
        .map(|c| quote_ident(&c.name))
        .collect();
    if !pk.is_empty() {
        parts.push(format!("    PRIMARY KEY ({})", pk.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {} (\n{}\n);",
        quote_ident(&table.name),
        parts.join(",\n")
    ))
}

pub fn add_column_statement(table_name: &str, column: &ColumnDescriptor) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ADD COLUMN {};",
        quote_ident(table_name),
        column_definition(column)?
    ))
}

/// Restate a column's type, nullability and default in one ALTER TABLE.
///
/// The statement does not depend on the column's previous state, so it can
/// be re-run safely. The type change carries no `USING` clause: Postgres
/// converts with its assignment cast, which fails on values that no longer
/// fit instead of truncating them. Constraint changes (primary key,
/// uniqueness, identity) need the previous state and are handled by
/// [`difference_statements`] and [`diff_statements`].
pub fn modify_column_statement(table_name: &str, column: &ColumnDescriptor) -> Result<String> {
    restate_column(table_name, &column.name, column, false)
}

pub fn drop_column_statement(table_name: &str, column_name: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {};",
        quote_ident(table_name),
        quote_ident(column_name)
    )
}

/// The statements that apply one difference, in execution order.
///
/// Primary key changes span columns and are left to [`diff_statements`].
pub fn difference_statements(difference: &SchemaDifference) -> Result<Vec<String>> {
    match difference {
        SchemaDifference::AddColumn { table, column } => {
            Ok(vec![add_column_statement(table, column)?])
        }
        SchemaDifference::ModifyColumn { table, old, new } => {
            modify_statements(table, old, new)
        }
        SchemaDifference::RemoveColumn { table, column } => {
            Ok(vec![drop_column_statement(table, &column.name)])
        }
    }
}

/// All statements for a diff, in execution order:
///
/// 1. one CREATE TABLE per new table;
/// 2. the primary keys being replaced are dropped;
/// 3. column-level statements for tables that already exist;
/// 4. the replacement primary keys are added, one per table.
pub fn diff_statements(diff: &SchemaDiff) -> Result<Vec<String>> {
    let mut statements = Vec::new();
    for table in &diff.new_tables {
        statements.push(create_table_statement(table)?);
    }
    for change in &diff.key_changes {
        if !change.old_columns.is_empty() {
            statements.push(drop_primary_key_statement(change));
        }
    }
    for difference in &diff.differences {
        if diff.is_new_table(difference.table_name()) {
            continue;
        }
        statements.extend(difference_statements(difference)?);
    }
    for change in &diff.key_changes {
        if !change.new_columns.is_empty() {
            statements.push(add_primary_key_statement(change));
        }
    }
    Ok(statements)
}

/// CREATE TABLE statements for every table of a schema, in order.
pub fn schema_statements(schema: &Schema) -> Result<Vec<String>> {
    schema.iter_tables().map(create_table_statement).collect()
}

/// Drop a table's primary key by the name the catalog reported, or by the
/// name Postgres gives it by default.
fn drop_primary_key_statement(change: &KeyChange) -> String {
    let name = change
        .constraint
        .clone()
        .unwrap_or_else(|| format!("{}_pkey", change.table));
    format!(
        "ALTER TABLE {} DROP CONSTRAINT {};",
        quote_ident(&change.table),
        quote_ident(&name)
    )
}

fn add_primary_key_statement(change: &KeyChange) -> String {
    let columns: Vec<String> = change.new_columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "ALTER TABLE {} ADD PRIMARY KEY ({});",
        quote_ident(&change.table),
        columns.join(", ")
    )
}

/// `old` is the live column: its name is the one the database knows.
fn modify_statements(
    table: &str,
    old: &ColumnDescriptor,
    new: &ColumnDescriptor,
) -> Result<Vec<String>> {
    let t = quote_ident(table);
    let c = quote_ident(&old.name);
    let wants_identity = generation_clause(new).is_some_and(|g| g == IDENTITY_CLAUSE);

    let mut statements = Vec::new();

    // Drops first: SET/DROP DEFAULT fails on a column that is still an
    // identity column. A serial column is not one, hence IF EXISTS; its
    // sequence default goes with the DROP DEFAULT below.
    if old.is_auto_increment && !wants_identity {
        statements.push(format!(
            "ALTER TABLE {t} ALTER COLUMN {c} DROP IDENTITY IF EXISTS;"
        ));
    }
    if old.is_unique && !new.is_unique {
        statements.push(match &old.key_object {
            Some(KeyObject::Index(index)) => format!("DROP INDEX {};", quote_ident(index)),
            Some(KeyObject::Constraint(constraint)) => format!(
                "ALTER TABLE {t} DROP CONSTRAINT {};",
                quote_ident(constraint)
            ),
            None => format!(
                "ALTER TABLE {t} DROP CONSTRAINT {};",
                unique_constraint_name(table, &old.name)
            ),
        });
    }

    let retyped = old.semantic_type != new.semantic_type;
    statements.push(restate_column(table, &old.name, new, retyped)?);

    if wants_identity && !old.is_auto_increment {
        statements.push(format!(
            "ALTER TABLE {t} ALTER COLUMN {c} ADD {IDENTITY_CLAUSE};"
        ));
    }
    if new.is_unique && !old.is_unique && !new.is_primary_key {
        statements.push(format!(
            "ALTER TABLE {t} ADD CONSTRAINT {} UNIQUE ({c});",
            unique_constraint_name(table, &old.name)
        ));
    }

    Ok(statements)
}

/// Postgres' default name for a single-column unique constraint.
fn unique_constraint_name(table: &str, column: &str) -> String {
    quote_ident(&format!("{}_{}_key", table, column))
}

/// ALTER TABLE addressing the column as `name`, restating it as `column`.
/// `USING` forces an explicit cast and is only wanted when the type itself
/// changes.
fn restate_column(
    table_name: &str,
    name: &str,
    column: &ColumnDescriptor,
    using: bool,
) -> Result<String> {
    let name = quote_ident(name);
    let ty = semantic_to_ddl(column.semantic_type, column)?;

    let mut retype = format!("ALTER COLUMN {name} TYPE {ty}{}", collate_clause(column));
    if using {
        retype.push_str(&format!(" USING {name}::{ty}"));
    }
    let mut actions = vec![retype];

    if column.is_nullable {
        actions.push(format!("ALTER COLUMN {name} DROP NOT NULL"));
    } else {
        actions.push(format!("ALTER COLUMN {name} SET NOT NULL"));
    }

    if generation_clause(column).is_none() {
        match &column.default_value {
            Some(default) => actions.push(format!("ALTER COLUMN {name} SET DEFAULT {default}")),
            None => actions.push(format!("ALTER COLUMN {name} DROP DEFAULT")),
        }
    }

    Ok(format!(
        "ALTER TABLE {} {};",
        quote_ident(table_name),
        actions.join(", ")
    ))
}

/// `name type [COLLATE] [generation] [DEFAULT] NULL|NOT NULL [UNIQUE]`
fn column_definition(column: &ColumnDescriptor) -> Result<String> {
    let mut def = format!(
        "{} {}{}",
        quote_ident(&column.name),
        semantic_to_ddl(column.semantic_type, column)?,
        collate_clause(column)
    );

    match generation_clause(column) {
        Some(clause) => {
            def.push(' ');
            def.push_str(&clause);
        }
        None => {
            if let Some(default) = &column.default_value {
                def.push_str(&format!(" DEFAULT {}", default));
            }
        }
    }

    def.push_str(if column.is_nullable { " NULL" } else { " NOT NULL" });

    if column.is_unique && !column.is_primary_key {
        def.push_str(" UNIQUE");
    }

    Ok(def)
}

/// Identity only applies to primary key columns; computed columns fall back
/// to [`COMPUTED_PLACEHOLDER`] when the model carries no expression.
fn generation_clause(column: &ColumnDescriptor) -> Option<String> {
    match column.generation {
        GenerationPolicy::Identity if column.is_primary_key => Some(IDENTITY_CLAUSE.to_string()),
        GenerationPolicy::Computed => Some(format!(
            "GENERATED ALWAYS AS ({}) STORED",
            column
                .computed_expression
                .as_deref()
                .unwrap_or(COMPUTED_PLACEHOLDER)
        )),
        _ => None,
    }
}

fn collate_clause(column: &ColumnDescriptor) -> String {
    column
        .collation
        .as_ref()
        .map(|c| format!(" COLLATE {}", quote_ident(c)))
        .unwrap_or_default()
}

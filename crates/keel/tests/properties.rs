//! Property tests for the diff: applying a diff converges, and names match
//! regardless of case.
//!
//! "Applying" is simulated: each column touched by the diff is rendered to
//! its Postgres type and read back through the catalog path, the way a real
//! database would report it.

use keel::ddl::diff_statements;
use keel::introspect::schema_from_catalog;
use keel::types::semantic_to_ddl;
use keel::{
    CatalogRow, ColumnDescriptor, EntityModel, GenerationPolicy, IndexModel, Model,
    PropertyModel, Schema, SchemaDifference, TableDescriptor, compare,
};
use proptest::prelude::*;

const TYPES: [&str; 12] = [
    "int16", "int32", "int64", "float32", "float64", "decimal", "bool", "text", "datetime",
    "datetimeoffset", "uuid", "json",
];

fn arb_property(name: String) -> impl Strategy<Value = PropertyModel> {
    (
        prop::sample::select(TYPES.to_vec()),
        any::<bool>(),
        prop::option::of(1u32..500),
        prop::option::of((1u32..30, 0u32..10)),
        prop::option::of(prop::sample::select(vec!["0", "'x'", "now()"])),
        any::<bool>(),
    )
        .prop_map(move |(ty, optional, len, precision, default, collate)| {
            let mut property = PropertyModel::new(name.clone(), ty);
            property.optional = optional;
            if ty == "text" {
                property.max_length = len;
                if collate {
                    property.collation = Some("C".to_string());
                }
            }
            if ty == "decimal" {
                if let Some((p, s)) = precision {
                    property = property.precision(p, s.min(p));
                }
            }
            property.default_value = default.map(str::to_string);
            property
        })
}

fn arb_entity(name: String) -> impl Strategy<Value = EntityModel> {
    (1usize..5)
        .prop_flat_map(|n| {
            (
                (0..n)
                    .map(|i| arb_property(format!("c{i}")))
                    .collect::<Vec<_>>(),
                0..=n,
                any::<bool>(),
                prop::option::of(0..n),
            )
        })
        .prop_map(move |(properties, key_len, identity, unique)| {
            let keyed = key_len > 0;
            let mut entity = EntityModel::new(name.clone());
            entity.key = properties[..key_len]
                .iter()
                .map(|p| p.name.clone())
                .collect();
            if let Some(i) = unique {
                entity = entity.index(IndexModel::unique([properties[i].name.clone()]));
            }
            for (i, mut property) in properties.into_iter().enumerate() {
                if i == 0 && keyed && identity {
                    property.value_type = "int64".to_string();
                    property.generated_on_add = true;
                }
                entity = entity.property(property);
            }
            entity
        })
}

fn arb_model() -> impl Strategy<Value = Model> {
    (1usize..4).prop_flat_map(|n| {
        (0..n)
            .map(|i| arb_entity(format!("t{i}")))
            .collect::<Vec<_>>()
            .prop_map(|entities| Model { entities })
    })
}

/// What Postgres reports for a column created from `column`.
fn catalog_row(table: &str, column: &ColumnDescriptor) -> CatalogRow {
    let ddl = semantic_to_ddl(column.semantic_type, column).unwrap();
    let (native, args) = match ddl.split_once('(') {
        Some((base, rest)) => (base.to_string(), rest.trim_end_matches(')').to_string()),
        None => (ddl.clone(), String::new()),
    };
    let args: Vec<i32> = args
        .split(',')
        .filter_map(|a| a.trim().parse().ok())
        .collect();

    let identity = column.generation == GenerationPolicy::Identity && column.is_primary_key;
    let computed = column.generation == GenerationPolicy::Computed;

    let mut row = CatalogRow {
        table_name: Some(table.to_string()),
        column_name: Some(column.name.clone()),
        native_type: match native.as_str() {
            "varchar" => "character varying".to_string(),
            "timestamptz" => "timestamp with time zone".to_string(),
            _ => native.clone(),
        },
        is_nullable: column.is_nullable,
        collation: column.collation.clone(),
        column_key: if column.is_primary_key {
            "PRI".to_string()
        } else if column.is_unique {
            "UNI".to_string()
        } else {
            String::new()
        },
        extra: match (identity, computed) {
            (true, _) => "identity".to_string(),
            (_, true) => "generated".to_string(),
            _ => String::new(),
        },
        ..Default::default()
    };
    match native.as_str() {
        "varchar" => row.max_length = args.first().copied(),
        "numeric" => {
            row.numeric_precision = args.first().copied();
            row.numeric_scale = args.get(1).copied();
        }
        "integer" => row.numeric_precision = Some(32),
        _ => {}
    }
    if !identity && !computed {
        row.default_value = column.default_value.as_ref().map(|d| {
            if d.starts_with('\'') {
                format!("{d}::{native}")
            } else {
                d.clone()
            }
        });
    }
    row
}

fn read_back(table: &str, column: &ColumnDescriptor) -> ColumnDescriptor {
    let schema = schema_from_catalog([catalog_row(table, column)]).unwrap();
    schema.iter_tables().next().unwrap().columns[0].clone()
}

/// Apply `desired - live` to `live` as the database would.
fn apply(live: &Schema, desired: &Schema) -> Schema {
    let diff = compare(live, desired);
    let mut tables: Vec<TableDescriptor> = live.iter_tables().cloned().collect();

    for table in &diff.new_tables {
        let columns = table
            .columns
            .iter()
            .map(|c| read_back(&table.name, c))
            .collect();
        tables.push(TableDescriptor::new(table.name.clone(), columns).unwrap());
    }

    for difference in &diff.differences {
        if diff.is_new_table(difference.table_name()) {
            continue;
        }
        let table = tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(difference.table_name()))
            .unwrap();
        match difference {
            SchemaDifference::AddColumn { column, .. } => {
                table.columns.push(read_back(&table.name, column));
            }
            SchemaDifference::ModifyColumn { new, .. } => {
                let slot = table
                    .columns
                    .iter_mut()
                    .find(|c| c.name.eq_ignore_ascii_case(&new.name))
                    .unwrap();
                *slot = read_back(&table.name, new);
            }
            SchemaDifference::RemoveColumn { column, .. } => {
                table
                    .columns
                    .retain(|c| !c.name.eq_ignore_ascii_case(&column.name));
            }
        }
    }

    Schema::from_tables(tables).unwrap()
}

fn shout(schema: &Schema) -> Schema {
    Schema::from_tables(schema.iter_tables().map(|t| {
        let columns = t
            .columns
            .iter()
            .map(|c| ColumnDescriptor {
                name: c.name.to_uppercase(),
                ..c.clone()
            })
            .collect();
        TableDescriptor::new(t.name.to_uppercase(), columns).unwrap()
    }))
    .unwrap()
}

proptest! {
    #[test]
    fn created_schema_reads_back_without_changes(model in arb_model()) {
        let desired = keel::model::read_desired_schema(&model).unwrap();
        let created = apply(&Schema::new(), &desired);
        let diff = compare(&created, &desired);
        prop_assert!(diff.is_empty(), "{}", diff);
    }

    #[test]
    fn applying_a_diff_converges(before in arb_model(), after in arb_model()) {
        let live = apply(&Schema::new(), &keel::model::read_desired_schema(&before).unwrap());
        let desired = keel::model::read_desired_schema(&after).unwrap();

        let applied = apply(&live, &desired);
        let diff = compare(&applied, &desired);
        prop_assert!(diff.is_empty(), "{}", diff);

        // Every statement renders, and each table's key is replaced at most
        // once.
        let statements = diff_statements(&compare(&live, &desired)).unwrap();
        for table in desired.iter_tables() {
            let prefix = format!("ALTER TABLE \"{}\" ADD PRIMARY KEY", table.name);
            prop_assert!(statements.iter().filter(|s| s.starts_with(&prefix)).count() <= 1);
        }
    }

    #[test]
    fn names_match_regardless_of_case(before in arb_model(), after in arb_model()) {
        let live = apply(&Schema::new(), &keel::model::read_desired_schema(&before).unwrap());
        let desired = keel::model::read_desired_schema(&after).unwrap();

        let plain = compare(&live, &desired);
        let shouted = compare(&shout(&live), &desired);
        prop_assert_eq!(plain.len(), shouted.len());
        prop_assert_eq!(plain.new_tables.len(), shouted.new_tables.len());
    }
}

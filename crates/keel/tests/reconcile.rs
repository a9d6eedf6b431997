//! End-to-end refreshes against an in-memory connector that records every
//! call it receives.

use keel::{
    BoxFuture, CatalogRow, Connector, ConnectorError, EntityModel, Error, Model, Phase,
    PropertyModel, Reconciler, RefreshState, RefreshTarget,
};

#[derive(Default)]
struct RecordingConnector {
    reachable: bool,
    catalog: Vec<CatalogRow>,
    /// Fail the statement at this index
    fail_at: Option<usize>,
    executed: Vec<String>,
    created_with: Option<Vec<String>>,
    opened: bool,
}

impl RecordingConnector {
    fn reachable(catalog: Vec<CatalogRow>) -> Self {
        Self {
            reachable: true,
            catalog,
            ..Default::default()
        }
    }

    fn unreachable() -> Self {
        Self::default()
    }
}

impl Connector for RecordingConnector {
    fn can_connect(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.reachable })
    }

    fn ensure_full_schema_created<'a>(
        &'a mut self,
        statements: &'a [String],
    ) -> BoxFuture<'a, Result<(), ConnectorError>> {
        Box::pin(async move {
            self.created_with = Some(statements.to_vec());
            Ok(())
        })
    }

    fn open_connection(&mut self) -> BoxFuture<'_, Result<(), ConnectorError>> {
        Box::pin(async move {
            self.opened = true;
            Ok(())
        })
    }

    fn query_catalog(&mut self) -> BoxFuture<'_, Result<Vec<CatalogRow>, ConnectorError>> {
        Box::pin(async move {
            if !self.opened {
                return Err(ConnectorError::NotConnected);
            }
            Ok(self.catalog.clone())
        })
    }

    fn execute_statement<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> BoxFuture<'a, Result<u64, ConnectorError>> {
        Box::pin(async move {
            if self.fail_at == Some(self.executed.len()) {
                return Err(ConnectorError::other("relation is locked"));
            }
            self.executed.push(sql.to_string());
            Ok(0)
        })
    }
}

fn column(table: &str, name: &str, native: &str) -> CatalogRow {
    CatalogRow {
        table_name: Some(table.to_string()),
        column_name: Some(name.to_string()),
        native_type: native.to_string(),
        is_nullable: true,
        ..Default::default()
    }
}

fn temp_id() -> CatalogRow {
    CatalogRow {
        is_nullable: false,
        column_key: "PRI".to_string(),
        extra: "identity".to_string(),
        ..column("Temp", "Id", "integer")
    }
}

fn varchar(table: &str, name: &str, len: i32, nullable: bool) -> CatalogRow {
    CatalogRow {
        max_length: Some(len),
        is_nullable: nullable,
        ..column(table, name, "character varying")
    }
}

fn temp_model() -> Model {
    Model::new().entity(
        EntityModel::new("Temp")
            .key(["Id"])
            .property(PropertyModel::new("Id", "int32").generated_on_add())
            .property(PropertyModel::new("Con", "Option<String>").max_length(1000))
            .property(PropertyModel::new("Temp", "text").max_length(10)),
    )
}

#[tokio::test]
async fn unreachable_database_is_created_from_the_model() {
    let model = temp_model();
    let mut connector = RecordingConnector::unreachable();

    let outcome = Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap();

    assert_eq!(outcome.state, RefreshState::SchemaCreated);
    assert_eq!(outcome.applied, 0);
    assert!(connector.executed.is_empty());
    let created = connector.created_with.unwrap();
    assert_eq!(created.len(), 1);
    insta::assert_snapshot!(created[0], @r#"
    CREATE TABLE "Temp" (
        "Id" integer GENERATED BY DEFAULT AS IDENTITY NOT NULL,
        "Con" varchar(1000) NULL,
        "Temp" varchar(10) NOT NULL,
        PRIMARY KEY ("Id")
    );
    "#);
}

#[tokio::test]
async fn missing_table_is_created_in_an_existing_database() {
    let model = temp_model();
    let mut connector = RecordingConnector::reachable(vec![column("other", "id", "integer")]);

    let outcome = Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap();

    assert_eq!(outcome.state, RefreshState::SchemaUpdated);
    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.diff.len(), 3);
    assert!(outcome.diff.is_new_table("temp"));
    assert_eq!(connector.executed.len(), 1);
    assert!(connector.executed[0].starts_with("CREATE TABLE \"Temp\" ("));
}

#[tokio::test]
async fn up_to_date_schema_executes_nothing() {
    let model = temp_model();
    let mut connector = RecordingConnector::reachable(vec![
        temp_id(),
        varchar("Temp", "Con", 1000, true),
        varchar("Temp", "Temp", 10, false),
    ]);

    let outcome = Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap();

    assert_eq!(outcome.state, RefreshState::SchemaUpdated);
    assert!(outcome.diff.is_empty());
    assert!(connector.executed.is_empty());
    assert!(connector.opened);
}

#[tokio::test]
async fn live_only_column_is_dropped() {
    let model = temp_model();
    let mut connector = RecordingConnector::reachable(vec![
        temp_id(),
        varchar("Temp", "Con", 1000, true),
        varchar("Temp", "Temp", 10, false),
        varchar("Temp", "Legacy", 50, true),
    ]);

    Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap();

    assert_eq!(
        connector.executed,
        ["ALTER TABLE \"Temp\" DROP COLUMN \"Legacy\";"]
    );
}

#[tokio::test]
async fn case_differences_are_not_changes() {
    let model = temp_model();
    let mut connector = RecordingConnector::reachable(vec![
        CatalogRow {
            table_name: Some("TEMP".to_string()),
            column_name: Some("ID".to_string()),
            ..temp_id()
        },
        varchar("temp", "con", 1000, true),
        varchar("temp", "TEMP", 10, false),
    ]);

    let outcome = Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap();
    assert!(outcome.diff.is_empty());
}

#[tokio::test]
async fn changes_address_the_live_spelling() {
    let model = temp_model();
    let mut connector = RecordingConnector::reachable(vec![
        CatalogRow {
            table_name: Some("TEMP".to_string()),
            column_name: Some("ID".to_string()),
            ..temp_id()
        },
        varchar("TEMP", "CON", 500, true),
        varchar("TEMP", "TEMP", 10, false),
    ]);

    let outcome = Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap();

    assert_eq!(outcome.applied, 1);
    assert_eq!(
        connector.executed,
        ["ALTER TABLE \"TEMP\" ALTER COLUMN \"CON\" TYPE varchar(1000), \
          ALTER COLUMN \"CON\" DROP NOT NULL, ALTER COLUMN \"CON\" DROP DEFAULT;"]
    );
}

#[tokio::test]
async fn growing_a_key_replaces_it_whole() {
    let model = Model::new().entity(
        EntityModel::new("t")
            .key(["a", "b"])
            .property(PropertyModel::new("a", "int32"))
            .property(PropertyModel::new("b", "int32")),
    );
    let mut connector = RecordingConnector::reachable(vec![
        CatalogRow {
            is_nullable: false,
            column_key: "PRI".to_string(),
            key_name: Some("t_pkey".to_string()),
            key_is_constraint: true,
            ..column("t", "a", "integer")
        },
        column("t", "b", "integer"),
    ]);

    Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap();

    assert_eq!(connector.executed.len(), 3);
    assert_eq!(connector.executed[0], "ALTER TABLE \"t\" DROP CONSTRAINT \"t_pkey\";");
    assert_eq!(
        connector.executed[2],
        "ALTER TABLE \"t\" ADD PRIMARY KEY (\"a\", \"b\");"
    );
}

#[tokio::test]
async fn dropping_a_unique_uses_the_live_index_name() {
    let model = Model::new().entity(
        EntityModel::new("u").property(PropertyModel::new("email", "Option<text>")),
    );
    let mut connector = RecordingConnector::reachable(vec![CatalogRow {
        max_length: Some(255),
        column_key: "UNI".to_string(),
        key_name: Some("u_email_idx".to_string()),
        ..column("u", "email", "character varying")
    }]);

    Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap();

    assert_eq!(connector.executed[0], "DROP INDEX \"u_email_idx\";");
}

#[tokio::test]
async fn failed_statement_reports_partial_application() {
    let model = temp_model();
    let mut connector = RecordingConnector::reachable(vec![
        temp_id(),
        varchar("Temp", "Temp", 5, true),
        varchar("Temp", "Legacy", 50, true),
    ]);
    connector.fail_at = Some(1);

    let err = Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::Apply);
    assert!(err.touched_schema());
    match &err.source {
        Error::StatementExecution { applied, sql, .. } => {
            assert_eq!(*applied, 1);
            assert!(sql.contains("\"Temp\""), "{sql}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(connector.executed.len(), 1);
    assert!(connector.executed[0].contains("ADD COLUMN \"Con\""));
}

#[tokio::test]
async fn failure_on_first_statement_leaves_schema_untouched() {
    let model = temp_model();
    let mut connector = RecordingConnector::reachable(vec![temp_id()]);
    connector.fail_at = Some(0);

    let err = Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::Apply);
    assert!(!err.touched_schema());
}

#[tokio::test]
async fn unknown_native_type_fails_introspection() {
    let model = temp_model();
    let mut connector = RecordingConnector::reachable(vec![
        temp_id(),
        column("Temp", "search", "tsvector"),
    ]);

    let err = Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::Introspection);
    assert!(!err.touched_schema());
    assert!(connector.executed.is_empty());
    assert_eq!(err.to_string(), "introspection failed for target `app`");
    assert_eq!(
        err.source.to_string(),
        "unsupported native type `tsvector` for column Temp.search"
    );
}

#[tokio::test]
async fn unmappable_type_fails_before_executing_anything() {
    let model = Model::new().entity(
        EntityModel::new("counter")
            .property(PropertyModel::new("name", "text"))
            .property(PropertyModel::new("hits", "uint64")),
    );
    let mut connector = RecordingConnector::reachable(vec![column("counter", "name", "text")]);

    let err = Reconciler::new()
        .refresh(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::Diff);
    assert!(matches!(err.source, Error::UnsupportedSemanticType { .. }));
    assert!(connector.executed.is_empty());
}

#[tokio::test]
async fn refresh_all_stops_at_the_first_failure() {
    let model = temp_model();
    let mut first = RecordingConnector::reachable(vec![temp_id()]);
    let mut second = RecordingConnector::reachable(vec![column("Temp", "x", "tsvector")]);
    let mut third = RecordingConnector::unreachable();

    let err = Reconciler::new()
        .refresh_all([
            RefreshTarget::new("first", &mut first, &model),
            RefreshTarget::new("second", &mut second, &model),
            RefreshTarget::new("third", &mut third, &model),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.target, "second");
    assert_eq!(first.executed.len(), 2);
    assert!(third.created_with.is_none());
}

#[tokio::test]
async fn plan_does_not_execute() {
    let model = temp_model();
    let mut connector = RecordingConnector::reachable(vec![temp_id()]);

    let plan = Reconciler::new()
        .plan(RefreshTarget::new("app", &mut connector, &model))
        .await
        .unwrap();

    assert!(!plan.creates_database);
    assert_eq!(plan.statements.len(), 2);
    assert!(connector.executed.is_empty());

    let mut unreachable = RecordingConnector::unreachable();
    let plan = Reconciler::new()
        .plan(RefreshTarget::new("app", &mut unreachable, &model))
        .await
        .unwrap();
    assert!(plan.creates_database);
    assert_eq!(plan.statements.len(), 1);
    assert!(unreachable.created_with.is_none());
}

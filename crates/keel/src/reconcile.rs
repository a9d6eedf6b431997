//! Driving a refresh end to end.
//!
//! ```text
//! NotStarted -> DatabaseChecked -> SchemaCreated
//!                               -> SchemaCompared -> SchemaUpdated
//! (any step) -> Failed
//! ```
//!
//! A database that cannot be reached is created from scratch and taken as
//! authoritative: nothing is diffed. Otherwise the live catalog is read, the
//! model is extracted, and every statement of the diff is executed in order.
//! Statements are not wrapped in a transaction; a failure leaves the ones
//! before it applied, which [`RefreshError::touched_schema`] reports.

use crate::connector::Connector;
use crate::ddl::{diff_statements, schema_statements};
use crate::diff::{SchemaDiff, compare};
use crate::error::{Error, Phase, RefreshError};
use crate::introspect::read_live_schema;
use crate::model::{ModelProvider, read_desired_schema};
use std::fmt;
use tracing::{debug, info};

/// Where a refresh got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    NotStarted,
    DatabaseChecked,
    /// The database was created from the model. Terminal.
    SchemaCreated,
    SchemaCompared,
    /// The live schema was brought in line with the model. Terminal.
    SchemaUpdated,
    Failed,
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RefreshState::NotStarted => "not started",
            RefreshState::DatabaseChecked => "database checked",
            RefreshState::SchemaCreated => "schema created",
            RefreshState::SchemaCompared => "schema compared",
            RefreshState::SchemaUpdated => "schema updated",
            RefreshState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One database to refresh, and the model it should match.
pub struct RefreshTarget<'a> {
    pub name: &'a str,
    pub connector: &'a mut dyn Connector,
    pub model: &'a dyn ModelProvider,
}

impl<'a> RefreshTarget<'a> {
    pub fn new(
        name: &'a str,
        connector: &'a mut dyn Connector,
        model: &'a dyn ModelProvider,
    ) -> Self {
        Self {
            name,
            connector,
            model,
        }
    }
}

/// What a successful refresh did.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub target: String,
    /// `SchemaCreated` or `SchemaUpdated`
    pub state: RefreshState,
    /// The applied diff. Empty when the schema was created from scratch.
    pub diff: SchemaDiff,
    /// Number of statements executed
    pub applied: usize,
}

/// What a refresh would do, without doing it.
#[derive(Debug, Clone)]
pub struct Plan {
    pub target: String,
    /// True if the database cannot be reached and would be created whole.
    pub creates_database: bool,
    pub diff: SchemaDiff,
    pub statements: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Runs refreshes. Holds no state: connectors and models are passed per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    pub fn new() -> Self {
        Self
    }

    /// Bring one target database in line with its model.
    pub async fn refresh(
        &self,
        target: RefreshTarget<'_>,
    ) -> Result<RefreshOutcome, RefreshError> {
        let RefreshTarget {
            name,
            connector,
            model,
        } = target;
        let fail = |phase: Phase| move |source: Error| RefreshError::new(name, phase, source);

        info!(target_name = name, "checking database");
        if !connector.can_connect().await {
            info!(target_name = name, "database unreachable, creating it from the model");
            let desired = read_desired_schema(model).map_err(fail(Phase::Extraction))?;
            let statements = schema_statements(&desired).map_err(fail(Phase::DatabaseCheck))?;
            connector
                .ensure_full_schema_created(&statements)
                .await
                .map_err(|e| fail(Phase::DatabaseCheck)(Error::Connectivity(e)))?;
            info!(
                target_name = name,
                tables = desired.len(),
                state = %RefreshState::SchemaCreated,
                "schema created"
            );
            return Ok(RefreshOutcome {
                target: name.to_string(),
                state: RefreshState::SchemaCreated,
                diff: SchemaDiff::default(),
                applied: 0,
            });
        }
        debug!(target_name = name, state = %RefreshState::DatabaseChecked);

        let diff = compare_target(name, connector, model).await?;
        debug!(target_name = name, state = %RefreshState::SchemaCompared, changes = diff.len());

        if diff.is_empty() {
            info!(target_name = name, "schema is up to date");
            return Ok(RefreshOutcome {
                target: name.to_string(),
                state: RefreshState::SchemaUpdated,
                diff,
                applied: 0,
            });
        }

        // Render everything before executing anything, so an unmappable type
        // fails without touching the database.
        let statements = diff_statements(&diff).map_err(fail(Phase::Diff))?;
        info!(
            target_name = name,
            changes = diff.len(),
            statements = statements.len(),
            "applying changes"
        );

        for (applied, sql) in statements.iter().enumerate() {
            debug!(target_name = name, sql = %sql, "executing");
            connector.execute_statement(sql).await.map_err(|source| {
                fail(Phase::Apply)(Error::StatementExecution {
                    sql: sql.clone(),
                    applied,
                    source,
                })
            })?;
        }

        info!(
            target_name = name,
            applied = statements.len(),
            state = %RefreshState::SchemaUpdated,
            "schema updated"
        );
        Ok(RefreshOutcome {
            target: name.to_string(),
            state: RefreshState::SchemaUpdated,
            diff,
            applied: statements.len(),
        })
    }

    /// Refresh each target in order, stopping at the first failure.
    pub async fn refresh_all<'a, I>(&self, targets: I) -> Result<Vec<RefreshOutcome>, RefreshError>
    where
        I: IntoIterator<Item = RefreshTarget<'a>>,
    {
        let mut outcomes = Vec::new();
        for target in targets {
            outcomes.push(self.refresh(target).await?);
        }
        Ok(outcomes)
    }

    /// Compute what [`Reconciler::refresh`] would execute, without executing
    /// it.
    pub async fn plan(&self, target: RefreshTarget<'_>) -> Result<Plan, RefreshError> {
        let RefreshTarget {
            name,
            connector,
            model,
        } = target;
        let fail = |phase: Phase| move |source: Error| RefreshError::new(name, phase, source);

        if !connector.can_connect().await {
            let desired = read_desired_schema(model).map_err(fail(Phase::Extraction))?;
            let statements = schema_statements(&desired).map_err(fail(Phase::DatabaseCheck))?;
            return Ok(Plan {
                target: name.to_string(),
                creates_database: true,
                diff: compare(&Default::default(), &desired),
                statements,
            });
        }

        let diff = compare_target(name, connector, model).await?;
        let statements = diff_statements(&diff).map_err(fail(Phase::Diff))?;
        Ok(Plan {
            target: name.to_string(),
            creates_database: false,
            diff,
            statements,
        })
    }
}

async fn compare_target(
    name: &str,
    connector: &mut dyn Connector,
    model: &dyn ModelProvider,
) -> Result<SchemaDiff, RefreshError> {
    let live = read_live_schema(connector)
        .await
        .map_err(|e| RefreshError::new(name, Phase::Introspection, e))?;
    info!(target_name = name, tables = live.len(), "read live schema");

    let desired =
        read_desired_schema(model).map_err(|e| RefreshError::new(name, Phase::Extraction, e))?;

    Ok(compare(&live, &desired))
}

//! [`Connector`] implementation on tokio-postgres.
//!
//! Every statement and catalog query runs inside a `debug` span carrying the
//! SQL text, so `RUST_LOG=keel=debug` shows exactly what was sent.

use crate::connector::{BoxFuture, Connector};
use crate::ddl::quote_ident;
use crate::error::ConnectorError;
use crate::introspect::{CATALOG_QUERY, CatalogRow};
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::Instrument;

/// Database used to check for and create the target database.
pub const DEFAULT_MAINTENANCE_DATABASE: &str = "postgres";

/// A connection to one Postgres database.
///
/// The connection is opened lazily and kept for the lifetime of the
/// connector.
pub struct PgConnector {
    config: Config,
    maintenance_database: String,
    client: Option<Client>,
}

impl PgConnector {
    /// Create a connector from a `postgres://` URL or a key/value string.
    pub fn from_url(url: &str) -> Result<Self, ConnectorError> {
        let config: Config = url.parse()?;
        Ok(Self::new(config))
    }

    pub fn new(config: Config) -> Self {
        Self {
            config,
            maintenance_database: DEFAULT_MAINTENANCE_DATABASE.to_string(),
            client: None,
        }
    }

    /// Use another database than `postgres` to create the target from.
    pub fn with_maintenance_database(mut self, database: impl Into<String>) -> Self {
        self.maintenance_database = database.into();
        self
    }

    /// Name of the target database.
    pub fn database_name(&self) -> &str {
        self.config
            .get_dbname()
            .or(self.config.get_user())
            .unwrap_or(DEFAULT_MAINTENANCE_DATABASE)
    }

    fn client(&self) -> Result<&Client, ConnectorError> {
        self.client
            .as_ref()
            .filter(|c| !c.is_closed())
            .ok_or(ConnectorError::NotConnected)
    }

    async fn open(&mut self) -> Result<(), ConnectorError> {
        if self.client().is_ok() {
            return Ok(());
        }
        self.client = Some(connect(&self.config).await?);
        Ok(())
    }

    async fn create_database_if_missing(&self) -> Result<(), ConnectorError> {
        let database = self.database_name().to_string();
        let mut maintenance = self.config.clone();
        maintenance.dbname(&self.maintenance_database);
        let client = connect(&maintenance).await?;

        let exists = client
            .query_opt("SELECT 1 FROM pg_database WHERE datname = $1", &[&database])
            .await?
            .is_some();
        if !exists {
            tracing::info!(database = %database, "creating database");
            execute(&client, &format!("CREATE DATABASE {}", quote_ident(&database))).await?;
        }
        Ok(())
    }

    async fn create_schema(&mut self, statements: &[String]) -> Result<(), ConnectorError> {
        self.create_database_if_missing().await?;
        self.open().await?;
        let client = self.client()?;

        let tables: i64 = client
            .query_one(
                "SELECT count(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'",
                &[],
            )
            .await?
            .try_get(0)?;
        if tables > 0 {
            tracing::warn!(
                database = %self.database_name(),
                tables,
                "database already has tables, not creating schema"
            );
            return Ok(());
        }

        for sql in statements {
            execute(client, sql).await?;
        }
        Ok(())
    }

    async fn catalog(&mut self) -> Result<Vec<CatalogRow>, ConnectorError> {
        let client = self.client()?;
        let span = tracing::debug_span!("db.query", sql = "catalog", rows = tracing::field::Empty);
        let rows = client
            .query(CATALOG_QUERY, &[])
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        rows.iter()
            .map(catalog_row)
            .collect::<Result<_, _>>()
            .map_err(ConnectorError::from)
    }
}

impl std::fmt::Debug for PgConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnector")
            .field("database", &self.database_name())
            .field("maintenance_database", &self.maintenance_database)
            .field("connected", &self.client().is_ok())
            .finish()
    }
}

impl Connector for PgConnector {
    fn can_connect(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match self.open().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(database = %self.database_name(), error = %e, "cannot connect");
                    false
                }
            }
        })
    }

    fn ensure_full_schema_created<'a>(
        &'a mut self,
        statements: &'a [String],
    ) -> BoxFuture<'a, Result<(), ConnectorError>> {
        Box::pin(self.create_schema(statements))
    }

    fn open_connection(&mut self) -> BoxFuture<'_, Result<(), ConnectorError>> {
        Box::pin(self.open())
    }

    fn query_catalog(&mut self) -> BoxFuture<'_, Result<Vec<CatalogRow>, ConnectorError>> {
        Box::pin(self.catalog())
    }

    fn execute_statement<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> BoxFuture<'a, Result<u64, ConnectorError>> {
        Box::pin(async move { execute(self.client()?, sql).await })
    }
}

async fn connect(config: &Config) -> Result<Client, ConnectorError> {
    let (client, connection) = config.connect(NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "database connection error");
        }
    });

    Ok(client)
}

async fn execute(client: &Client, sql: &str) -> Result<u64, ConnectorError> {
    let span = tracing::debug_span!(
        "db.execute",
        sql = %sql,
        affected = tracing::field::Empty,
    );
    let affected = client.execute(sql, &[]).instrument(span.clone()).await?;
    span.record("affected", affected);
    Ok(affected)
}

fn catalog_row(row: &Row) -> Result<CatalogRow, tokio_postgres::Error> {
    Ok(CatalogRow {
        table_name: row.try_get("table_name")?,
        column_name: row.try_get("column_name")?,
        native_type: row.try_get("native_type")?,
        is_nullable: row.try_get("is_nullable")?,
        max_length: row.try_get("max_length")?,
        numeric_precision: row.try_get("numeric_precision")?,
        numeric_scale: row.try_get("numeric_scale")?,
        default_value: row.try_get("default_value")?,
        collation: row.try_get("collation")?,
        column_key: row.try_get("column_key")?,
        key_name: row.try_get("key_name")?,
        key_is_constraint: row.try_get("key_is_constraint")?,
        extra: row.try_get("extra")?,
    })
}

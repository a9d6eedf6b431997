//! The database seam.
//!
//! Everything the reconciler needs from a database goes through [`Connector`].
//! [`crate::PgConnector`] implements it on tokio-postgres; tests implement it
//! in memory.

use crate::error::ConnectorError;
use crate::introspect::CatalogRow;
use std::future::Future;
use std::pin::Pin;

/// A boxed future, so that [`Connector`] stays object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Access to one target database.
///
/// Calls are made one at a time, in order; implementations do not need to be
/// re-entrant.
pub trait Connector: Send {
    /// Whether the target database exists and accepts connections.
    ///
    /// Returning `false` makes the reconciler create the database from
    /// scratch instead of diffing it.
    fn can_connect(&mut self) -> BoxFuture<'_, bool>;

    /// Create the database if it does not exist and run `statements` in it.
    ///
    /// Must not touch a database that already has tables.
    fn ensure_full_schema_created<'a>(
        &'a mut self,
        statements: &'a [String],
    ) -> BoxFuture<'a, Result<(), ConnectorError>>;

    /// Open the connection if it is not open yet.
    fn open_connection(&mut self) -> BoxFuture<'_, Result<(), ConnectorError>>;

    /// One row per column of every base table, grouped by table.
    fn query_catalog(&mut self) -> BoxFuture<'_, Result<Vec<CatalogRow>, ConnectorError>>;

    /// Execute a single DDL statement, returning the affected row count.
    fn execute_statement<'a>(&'a mut self, sql: &'a str)
    -> BoxFuture<'a, Result<u64, ConnectorError>>;
}

//! Startup schema reconciliation for Postgres.
//!
//! keel compares the live schema of a database with the schema declared by an
//! application model, and applies the column-level DDL needed to make the two
//! agree. It is meant to run once when the application boots: there is no
//! migration history, no rollback script, and nothing is ever dropped at the
//! table level.
//!
//! The pipeline, leaf-first:
//!
//! - [`types`] maps native column types to [`SemanticType`]s and back, and
//!   owns the table of safe widening conversions.
//! - [`introspect`] reads the live catalog into a [`Schema`].
//! - [`model`] turns a declarative [`Model`] into the desired [`Schema`].
//! - [`diff`] compares the two and yields [`SchemaDifference`]s.
//! - [`ddl`] renders tables and differences as SQL.
//! - [`reconcile`] drives all of the above against a [`Connector`].
//!
//! # Identifier matching
//!
//! Table and column names are matched case-insensitively everywhere: `Users`
//! and `users` are the same table. A schema that holds two tables (or a table
//! that holds two columns) differing only in case is rejected.
//!
//! # Renames
//!
//! There is no rename detection. A renamed column shows up as a removed column
//! plus an added one, and applying that drops the old column's data.
//!
//! # Example
//!
//! ```ignore
//! use keel::{Model, PgConnector, Reconciler, RefreshTarget};
//!
//! let model: Model = facet_styx::from_str(&source)?;
//! let mut connector = PgConnector::from_url("postgres://app@localhost/app")?;
//!
//! Reconciler::new()
//!     .refresh(RefreshTarget::new("app", &mut connector, &model))
//!     .await?;
//! ```

pub mod connector;
pub mod ddl;
pub mod diff;
mod error;
pub mod introspect;
pub mod model;
pub mod postgres;
pub mod reconcile;
pub mod schema;
pub mod types;

pub use connector::{BoxFuture, Connector};
pub use ddl::quote_ident;
pub use diff::{SchemaDiff, SchemaDifference, compare};
pub use error::{ConnectorError, Error, Phase, RefreshError};
pub use introspect::{CatalogRow, KeyKind};
pub use model::{EntityModel, IndexModel, Model, ModelProvider, PropertyModel};
pub use postgres::PgConnector;
pub use reconcile::{Plan, Reconciler, RefreshOutcome, RefreshState, RefreshTarget};
pub use schema::{ColumnDescriptor, GenerationPolicy, KeyObject, Schema, TableDescriptor};
pub use types::SemanticType;

/// Result type for keel operations.
pub type Result<T> = std::result::Result<T, Error>;

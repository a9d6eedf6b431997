use crate::types::SemanticType;
use std::fmt;
use thiserror::Error;

/// Error raised by a [`Connector`](crate::Connector).
///
/// The core never looks inside it: any connector error is fatal for the
/// operation that produced it.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("postgres error")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("no open connection")]
    NotConnected,

    #[error("{0}")]
    Other(String),
}

impl ConnectorError {
    pub fn other(message: impl Into<String>) -> Self {
        ConnectorError::Other(message.into())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The database could not be reached, opened, or created.
    #[error("cannot reach database")]
    Connectivity(#[source] ConnectorError),

    /// The catalog query itself failed.
    #[error("catalog query failed")]
    Catalog(#[source] ConnectorError),

    #[error(
        "unsupported native type `{native}`{}",
        .column.as_deref().map(|c| format!(" for column {c}")).unwrap_or_default()
    )]
    UnsupportedNativeType {
        native: String,
        column: Option<String>,
    },

    #[error("type {semantic} has no DDL mapping (column {column})")]
    UnsupportedSemanticType {
        semantic: SemanticType,
        column: String,
    },

    #[error("unknown type `{name}` on {entity}.{property}")]
    UnsupportedSemanticTypeName {
        name: String,
        entity: String,
        property: String,
    },

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("duplicate {kind} name `{name}` (names are compared case-insensitively)")]
    DuplicateName { kind: &'static str, name: String },

    /// A DDL statement failed. The `applied` statements that ran before it
    /// stay applied: execution is not transactional.
    #[error("statement failed after {applied} applied: {sql}")]
    StatementExecution {
        sql: String,
        applied: usize,
        #[source]
        source: ConnectorError,
    },
}

/// The step of a refresh during which an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    DatabaseCheck,
    Introspection,
    Extraction,
    Diff,
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::DatabaseCheck => write!(f, "database-check"),
            Phase::Introspection => write!(f, "introspection"),
            Phase::Extraction => write!(f, "extraction"),
            Phase::Diff => write!(f, "diff"),
            Phase::Apply => write!(f, "apply"),
        }
    }
}

/// An [`Error`] tagged with the target and phase it came from.
#[derive(Debug, Error)]
#[error("{phase} failed for target `{target}`")]
pub struct RefreshError {
    pub target: String,
    pub phase: Phase,
    #[source]
    pub source: Error,
}

impl RefreshError {
    pub fn new(target: impl Into<String>, phase: Phase, source: Error) -> Self {
        Self {
            target: target.into(),
            phase,
            source,
        }
    }

    /// Whether some DDL had already been applied when the error occurred.
    ///
    /// A `false` here means the live schema is exactly as it was before the
    /// refresh started.
    pub fn touched_schema(&self) -> bool {
        matches!(
            (&self.phase, &self.source),
            (Phase::Apply, Error::StatementExecution { applied, .. }) if *applied > 0
        )
    }
}

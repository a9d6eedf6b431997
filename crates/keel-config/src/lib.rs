//! Configuration schema for keel.
//!
//! Read from `.config/keel.styx`:
//!
//! ```styx
//! targets (
//!     {
//!         name app
//!         database_url "postgres://app@localhost/app"
//!         model "models/app.styx"
//!     }
//! )
//! ```

use facet::Facet;

/// Top-level configuration.
#[derive(Facet, Debug, Clone, Default)]
pub struct Config {
    /// Databases to refresh, in order
    #[facet(default)]
    pub targets: Vec<Target>,
}

impl Config {
    /// Find a target by name.
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// One database and the model it should match.
#[derive(Facet, Debug, Clone)]
pub struct Target {
    /// Name used in logs and on the command line
    pub name: String,

    /// Connection URL. Falls back to `DATABASE_URL` when there is a single
    /// target.
    #[facet(default)]
    pub database_url: Option<String>,

    /// Database to connect to when the target has to be created
    #[facet(default)]
    pub maintenance_database: Option<String>,

    /// Path of the model file, relative to the project root
    pub model: String,
}

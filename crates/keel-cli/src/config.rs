//! Configuration file handling for keel.
//!
//! Looks for `.config/keel.styx` in the current directory or any parent directory.

pub use keel_config::{Config, Target};

use camino::{Utf8Path, Utf8PathBuf};

const CONFIG_FILE: &str = ".config/keel.styx";

/// A loaded configuration and where it came from.
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    /// Path of the configuration file
    pub path: Utf8PathBuf,
    /// Directory holding `.config/`, which model paths are relative to
    pub root: Utf8PathBuf,
}

/// Load configuration from `.config/keel.styx`, searching up the directory tree.
pub fn load() -> Result<Loaded, ConfigError> {
    let cwd = std::env::current_dir()?;
    let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| ConfigError::NonUtf8(e.into_path_buf()))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Utf8Path) -> Result<Loaded, ConfigError> {
    let path = find_config_file(start)?;
    let content = std::fs::read_to_string(&path)?;

    let config: Config = facet_styx::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.clone(),
        message: e.to_string(),
    })?;

    let root = path
        .parent()
        .and_then(Utf8Path::parent)
        .map(Utf8Path::to_path_buf)
        .unwrap_or_default();

    Ok(Loaded { config, path, root })
}

impl Loaded {
    /// The targets to act on: all of them, or the one named.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&Target>, ConfigError> {
        match name {
            Some(name) => self
                .config
                .target(name)
                .map(|t| vec![t])
                .ok_or_else(|| ConfigError::UnknownTarget(name.to_string())),
            None if self.config.targets.is_empty() => Err(ConfigError::NoTargets),
            None => Ok(self.config.targets.iter().collect()),
        }
    }

    /// Read and parse a target's model file.
    pub fn load_model(&self, target: &Target) -> Result<keel::Model, ConfigError> {
        let path = self.root.join(&target.model);
        let content = std::fs::read_to_string(&path)?;
        facet_styx::from_str(&content).map_err(|e| ConfigError::Parse {
            path,
            message: e.to_string(),
        })
    }

    /// A target's database URL.
    ///
    /// `DATABASE_URL` is used when the target does not set one and it is the
    /// only target configured.
    pub fn database_url(&self, target: &Target) -> Result<String, ConfigError> {
        if let Some(url) = &target.database_url {
            return Ok(url.clone());
        }
        if self.config.targets.len() == 1 {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                return Ok(url);
            }
        }
        Err(ConfigError::MissingDatabaseUrl(target.name.clone()))
    }
}

/// Find `.config/keel.styx` by searching up the directory tree.
fn find_config_file(start: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no .config/keel.styx found in current directory or any parent")]
    NotFound,

    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8(std::path::PathBuf),

    #[error("failed to read file")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {path}: {message}")]
    Parse { path: Utf8PathBuf, message: String },

    #[error("no target named `{0}` in .config/keel.styx")]
    UnknownTarget(String),

    #[error(".config/keel.styx declares no targets")]
    NoTargets,

    #[error("target `{0}` has no database_url (set DATABASE_URL when there is a single target)")]
    MissingDatabaseUrl(String),
}

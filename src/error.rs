use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while resolving or validating configuration. All of these
/// are startup-fatal; a missing config file is not an error at all (the
/// resolver falls back to defaults plus environment overrides).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to assemble configuration sources: {0}")]
    Builder(#[source] config::ConfigError),

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: config::ConfigError,
    },

    #[error("failed to deserialize configuration: {0}")]
    Shape(#[source] config::ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The complete list of rule violations found in one validation pass. The
/// validator never short-circuits, so a single failed startup surfaces every
/// defect at once.
#[derive(Debug)]
pub struct ValidationError {
    pub violations: Vec<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "configuration validation failed:\n - {}",
            self.violations.join("\n - ")
        )
    }
}

impl std::error::Error for ValidationError {}

//! Deployment errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::aws::AwsError;

/// Errors that can stop a deployment.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A required setting is missing or unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The Dockerfile declares no port
    #[error("No EXPOSE directive found in {}", .path.display())]
    MissingPort { path: PathBuf },

    /// The Dockerfile declares more than one port
    #[error("{count} ports exposed in {}; pass --port to choose one", .path.display())]
    AmbiguousPort { count: usize, path: PathBuf },

    /// An AWS call failed
    #[error(transparent)]
    Aws(#[from] AwsError),

    /// The per-listener deploy lock could not be taken
    #[error("Could not lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The deployment history could not be written
    #[error("History error: {0}")]
    History(anyhow::Error),
}

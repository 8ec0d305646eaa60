//! Error taxonomy shared by the engine components.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// The package manager exited non-zero while adding requirements.
    #[error("{0}")]
    Install(String),

    /// The script exited non-zero; carries its stderr.
    #[error("{0}")]
    Execution(String),

    #[error("execution timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("File '{0}' not found")]
    NotFound(String),

    #[error("File size ({size_kb:.2} KB) exceeds maximum allowed size ({max_kb} KB)")]
    TooLarge { size_kb: f64, max_kb: u64 },

    #[error("Access denied: '{0}' is outside the working directory")]
    AccessDenied(String),

    #[error("failed to initialize project in {}: {stderr}", dir.display())]
    ProjectInit { dir: PathBuf, stderr: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Stable short name used in transport replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Install(_) => "install",
            Self::Execution(_) => "execution",
            Self::Timeout(_) => "timeout",
            Self::NotFound(_) => "not_found",
            Self::TooLarge { .. } => "too_large",
            Self::AccessDenied(_) => "access_denied",
            Self::ProjectInit { .. } => "project_init",
            Self::Spawn { .. } => "spawn",
            Self::Io(_) => "io",
        }
    }
}

pub type Result<T, E = RunnerError> = std::result::Result<T, E>;

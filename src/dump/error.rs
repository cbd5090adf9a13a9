use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Everything that can stop a dump attempt.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("{} not set in the environment or .env file", .missing.join(", "))]
    Configuration { missing: Vec<&'static str> },
    #[error("MYSQL_DB_PORT `{0}` is not a valid port number")]
    InvalidPort(String),
    #[error("could not create dump directory `{}`: {source}", .path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not open dump file `{}`: {source}", .path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not start `{tool}`: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("Error creating dump ({status}): {stderr}")]
    ToolExecution {
        path: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
    #[error("dump tool still running after {after:?}, killed")]
    Timeout { path: PathBuf, after: Duration },
    #[error("interrupted before the dump tool finished")]
    Interrupted,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl DumpError {
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DumpError::Configuration { .. } | DumpError::InvalidPort(_)
        )
    }

    /// The dump file left behind by a failed attempt, if one was created.
    pub fn partial_file(&self) -> Option<&PathBuf> {
        match self {
            DumpError::ToolExecution { path, .. } | DumpError::Timeout { path, .. } => Some(path),
            _ => None,
        }
    }
}

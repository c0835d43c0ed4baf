use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GitMetaError>;

#[derive(Debug, Error)]
pub enum GitMetaError {
    #[error("git executable not found or not runnable: `{program}`")]
    GitNotFound {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O failure while {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("git command failed: `{program}` {args:?}, exit_code={exit_code:?}, stderr={stderr}")]
    CommandFailed {
        program: String,
        args: Vec<String>,
        exit_code: Option<i32>,
        stderr: String,
        stdout: String,
    },

    #[error("not a git repository: {path} ({stderr})")]
    NotARepository {
        path: PathBuf,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("git command timed out after {timeout:?}: `{program}` {args:?}")]
    TimedOut {
        program: String,
        args: Vec<String>,
        timeout: Duration,
    },

    #[error("git command cancelled: `{program}` {args:?}")]
    Cancelled { program: String, args: Vec<String> },

    #[error("invalid commit log option: {0}")]
    InvalidOption(String),

    #[error("state error: {0}")]
    State(String),

    #[error("generate hook `{name}` failed: {message}")]
    Hook { name: String, message: String },
}

impl GitMetaError {
    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }

    /// Exit code of the git process, when it ran and exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } | Self::NotARepository { exit_code, .. } => {
                *exit_code
            }
            _ => None,
        }
    }

    /// Captured stderr of the failed git process.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { stderr, .. } | Self::NotARepository { stderr, .. } => {
                Some(stderr)
            }
            _ => None,
        }
    }
}

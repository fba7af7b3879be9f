use crate::command::ExitCode;
use crate::parser::ParseError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a line, or part of it, from running.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("cannot open {}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot create pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("waiting for pipeline failed: {0}")]
    Wait(#[source] io::Error),
    #[error("{command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl ShellError {
    /// Line status reported for a line that failed this way.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ShellError::Parse(_) => 2,
            ShellError::Redirect { .. } | ShellError::Pipe(_) | ShellError::Wait(_) => 1,
            ShellError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            ShellError::Spawn { .. } => 126,
        }
    }
}

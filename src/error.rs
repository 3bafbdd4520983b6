use std::path::PathBuf;
use thiserror::Error;

/// The crate's single `Result` error type. One variant family per row of
/// the error taxonomy: configuration failures abort before any I/O runs,
/// I/O and invariant violations are always fatal, input-data problems are
/// recorded and skipped rather than raised (see `load::LoadStats`), and
/// budget-exceeded conditions are absorbed at the call site and never
/// constructed as an error at all.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AssemblyError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        AssemblyError::Configuration(msg.into())
    }

    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        AssemblyError::Invariant(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        AssemblyError::Protocol(msg.into())
    }

    pub fn bad_path(path: &PathBuf, reason: &str) -> Self {
        AssemblyError::Configuration(format!("{}: {reason}", path.display()))
    }

    /// Process exit code matching the handling policy of each taxonomy row.
    pub fn exit_code(&self) -> i32 {
        match self {
            AssemblyError::Configuration(_) => 2,
            AssemblyError::Io(_) | AssemblyError::Invariant(_) | AssemblyError::Protocol(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;

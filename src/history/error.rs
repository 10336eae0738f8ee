use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Git error: {0}")]
    GitError(#[from] git2::Error),

    #[error("Invalid repository path")]
    InvalidRepository,

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Log format error at line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Version control command failed: {0}")]
    Vcs(String),

    #[error("Unknown commit: {0}")]
    UnknownCommit(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HistoryError {
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        HistoryError::Format {
            line,
            message: message.into(),
        }
    }
}

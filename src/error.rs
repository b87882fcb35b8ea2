use std::io;
use thiserror::Error;

/// Custom error type for the xtop application
#[derive(Error, Debug)]
pub enum XtopError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Source timed out: {0}")]
    SourceTimeout(String),

    #[error("Permission denied: {0}")]
    SourcePermissionDenied(String),

    #[error("Render failure: {0}")]
    RenderFailure(String),

    #[error("Startup failed: {0}")]
    FatalStartup(String),
}

/// Result type alias for the xtop application
pub type Result<T> = std::result::Result<T, XtopError>;

impl XtopError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        XtopError::Config(msg.into())
    }

    /// Create a render failure
    pub fn render<S: Into<String>>(msg: S) -> Self {
        XtopError::RenderFailure(msg.into())
    }

    /// Create an unrecoverable startup error
    pub fn fatal_startup<S: Into<String>>(msg: S) -> Self {
        XtopError::FatalStartup(msg.into())
    }

    /// Whether this error must terminate the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, XtopError::FatalStartup(_) | XtopError::Config(_))
    }
}

impl From<FetchError> for XtopError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotAvailable(msg) => XtopError::SourceUnavailable(msg),
            FetchError::Timeout(after) => {
                XtopError::SourceTimeout(format!("no answer after {}ms", after.as_millis()))
            }
            FetchError::PermissionDenied(msg) => XtopError::SourcePermissionDenied(msg),
        }
    }
}

/// Failure returned by a metric source adapter.
///
/// All three variants are recoverable: the scheduler keeps polling the
/// source on its own cadence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("not available: {0}")]
    NotAvailable(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(std::time::Duration),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl FetchError {
    pub fn not_available<S: Into<String>>(msg: S) -> Self {
        FetchError::NotAvailable(msg.into())
    }

    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        FetchError::PermissionDenied(msg.into())
    }

    /// Map an I/O error from a collaborator into the adapter taxonomy
    pub fn from_io(context: &str, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => {
                FetchError::PermissionDenied(format!("{}: {}", context, err))
            }
            _ => FetchError::NotAvailable(format!("{}: {}", context, err)),
        }
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to check target kind (ensure it's a domain or an IP address)")]
    HostParseFailed(#[source] url::ParseError),
    #[error("failed to resolve the given target: {0}")]
    ResolverFailed(#[source] std::io::Error),
    #[error("resolver didn't find any address mapped by `{0}`")]
    HostLookupFailed(String),
    #[error("failed to read targets from `{0}`: {1}")]
    TargetFileUnreadable(String, #[source] std::io::Error),
    #[error("no targets were given")]
    MissingTargets,
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,
    #[error("failed to create log directory `{0}`: {1}")]
    LogDirFailed(String, #[source] std::io::Error),
    #[error("failed to create log file `{0}`: {1}")]
    LogFileFailed(String, #[source] std::io::Error),
    #[error("failed to build the worker pool: {0}")]
    WorkerPoolFailed(#[source] rayon::ThreadPoolBuildError),
}

/// Outcome taxonomy of a single FTP session operation. `PermissionDenied`
/// is an expected result for most credential attempts; everything else is
/// either terminal for the current scan step or inconclusive.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    Connect(#[source] suppaftp::FtpError),
    #[error("server didn't announce a welcome banner")]
    Banner,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("login attempt was inconclusive: {0}")]
    Auth(#[source] suppaftp::FtpError),
    #[error("encrypted channel unavailable: {0}")]
    EncryptionUnsupported(String),
    #[error("protocol failure: {0}")]
    Protocol(#[source] suppaftp::FtpError),
    #[error("session was already closed")]
    Closed,
}

impl SessionError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SessionError::PermissionDenied(_))
    }
}

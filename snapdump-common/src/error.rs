use thiserror::Error;

/// Errors shared by the dump and restore binaries: configuration loading,
/// connection setup, and the handful of server probes both sides perform.
///
/// Fatal by construction -- a `CommonError` always aborts the run that
/// produced it. Per-job failures are modeled in each binary's own error
/// type instead (see `snapdump_dump::error::DumpError`,
/// `snapdump_load::error::LoadError`), since those are caught and folded
/// into the error counter rather than propagated.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("database connection error: {0}")]
    Connection(#[from] mysql_async::Error),

    #[error("unrecognized server dialect (version_comment={version_comment:?}, version={version})")]
    UnknownDialect {
        version_comment: Option<String>,
        version: String,
    },

    #[error("required session variable {name} could not be read: {source}")]
    SessionVariable {
        name: &'static str,
        #[source]
        source: mysql_async::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CommonResult<T> = Result<T, CommonError>;

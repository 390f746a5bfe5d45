use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Common(#[from] snapdump_common::CommonError),

    #[error("could not create output directory {path:?}: {source}")]
    OutputDirectory {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("resume files are not supported under streaming restore: {0}")]
    ResumeUnsupported(String),

    #[error("stream io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Non-fatal failure applying a single restore job.
#[derive(Debug, Error)]
pub enum RestoreJobError {
    #[error("failed to apply {file}: {source}")]
    Apply {
        file: String,
        #[source]
        source: mysql_async::Error,
    },
}

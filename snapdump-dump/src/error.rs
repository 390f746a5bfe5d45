use thiserror::Error;

/// Fatal errors that abort a dump run before or during setup. Anything
/// that can instead be retried or merely counted belongs in
/// [`JobError`], not here.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error(transparent)]
    Common(#[from] snapdump_common::CommonError),

    #[error("--stream and --exec are mutually exclusive")]
    StreamAndExecConflict,

    #[error("could not create output directory {path:?}: {source}")]
    OutputDirectory {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("FLUSH TABLES WITH READ LOCK failed: {0}")]
    GlobalLockFailed(mysql_async::Error),

    #[error("could not acquire locks for all configured tables after {attempts} attempts")]
    LockAllTablesExhausted { attempts: u32 },

    #[error("long-query guard did not clear after {retries} retries")]
    LongQueryGuardExhausted { retries: u32 },

    #[error("metadata file write failed: {0}")]
    Metadata(#[from] std::io::Error),
}

pub type DumpResult<T> = Result<T, DumpError>;

/// Non-fatal failure of a single job. Logged and folded into the run's
/// error counter; never propagated out of a worker's loop.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("query failed while dumping {table}: {source}")]
    Query {
        table: String,
        #[source]
        source: mysql_async::Error,
    },

    #[error("table {table} disappeared before it could be locked")]
    TableVanished { table: String },
}

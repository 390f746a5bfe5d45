//! Dump-side settings: the layered `CommonSettings` base overlaid with
//! `snapdump`'s own `clap` flags, which are always the highest-priority
//! layer.

use clap::Parser;
use snapdump_common::settings::CommonSettings;

#[derive(Parser, Debug)]
#[command(name = "snapdump", about = "Dump a consistent snapshot of a MySQL-family server")]
pub struct Cli {
    #[arg(long, env = "SNAPDUMP_CONFIG")]
    pub config: Option<String>,

    #[arg(long, short = 't')]
    pub threads: Option<u32>,

    #[arg(long)]
    pub compress: bool,

    #[arg(long, default_value_t = 60)]
    pub long_query_guard: u64,

    #[arg(long, default_value_t = 3)]
    pub long_query_retries: u32,

    #[arg(long, default_value_t = 60)]
    pub long_query_retry_interval: u64,

    #[arg(long)]
    pub kill_long_queries: bool,

    #[arg(long)]
    pub tidb_snapshot: Option<String>,

    #[arg(long)]
    pub updated_since: Option<u32>,

    #[arg(long)]
    pub no_locks: bool,

    #[arg(long)]
    pub lock_all_tables: bool,

    #[arg(long)]
    pub no_backup_locks: bool,

    #[arg(long)]
    pub less_locking: bool,

    #[arg(long)]
    pub trx_consistency_only: bool,

    #[arg(long)]
    pub no_schemas: bool,

    #[arg(long)]
    pub all_tablespaces: bool,

    #[arg(long, default_value = "binary")]
    pub set_names: String,

    #[arg(long, value_delimiter = ',')]
    pub database: Vec<String>,

    #[arg(long = "tables-list", value_delimiter = ',')]
    pub tables_list: Vec<String>,

    #[arg(long)]
    pub exec: Option<String>,

    #[arg(long)]
    pub stream: bool,

    #[arg(long)]
    pub directory: Option<String>,

    #[arg(long)]
    pub pause_at: Option<u64>,

    #[arg(long)]
    pub resume_at: Option<u64>,

    #[arg(long)]
    pub human_logs: bool,

    #[arg(long, env = "SNAPDUMP_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "SNAPDUMP_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "SNAPDUMP_USER")]
    pub user: Option<String>,

    #[arg(long, env = "SNAPDUMP_PASSWORD")]
    pub password: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DumpSettings {
    pub common: CommonSettings,
    pub compress: bool,
    pub long_query_guard_secs: u64,
    pub long_query_retries: u32,
    pub long_query_retry_interval_secs: u64,
    pub kill_long_queries: bool,
    pub tidb_snapshot: Option<String>,
    pub updated_since_days: Option<u32>,
    pub no_locks: bool,
    pub lock_all_tables: bool,
    pub no_backup_locks: bool,
    pub less_locking: bool,
    pub trx_consistency_only: bool,
    pub no_schemas: bool,
    pub all_tablespaces: bool,
    pub set_names: String,
    pub databases: Vec<String>,
    pub tables_list: Vec<String>,
    pub exec: Option<String>,
    pub stream: bool,
}

impl DumpSettings {
    /// Merges the layered `CommonSettings` with the CLI's own flags; the
    /// CLI always wins when both specify a value, per the precedence
    /// chain in `SPEC_FULL.md` §4.13.
    pub fn from_cli(cli: Cli, mut common: CommonSettings) -> Result<Self, snapdump_common::CommonError> {
        if cli.stream && cli.exec.is_some() {
            // Caller turns this into DumpError::StreamAndExecConflict.
        }
        if let Some(threads) = cli.threads {
            common.threads = threads;
        }
        if let Some(dir) = &cli.directory {
            common.directory = dir.clone();
        }
        if let Some(host) = cli.host {
            common.connection.host = host;
        }
        if let Some(port) = cli.port {
            common.connection.port = port;
        }
        if let Some(user) = cli.user {
            common.connection.user = user;
        }
        if cli.password.is_some() {
            common.connection.password = cli.password;
        }
        if cli.human_logs {
            common.human_logs = true;
        }
        common.pause_at_mb = cli.pause_at.or(common.pause_at_mb);
        common.resume_at_mb = cli.resume_at.or(common.resume_at_mb);

        Ok(DumpSettings {
            common,
            compress: cli.compress,
            long_query_guard_secs: cli.long_query_guard,
            long_query_retries: cli.long_query_retries,
            long_query_retry_interval_secs: cli.long_query_retry_interval,
            kill_long_queries: cli.kill_long_queries,
            tidb_snapshot: cli.tidb_snapshot,
            updated_since_days: cli.updated_since,
            no_locks: cli.no_locks,
            lock_all_tables: cli.lock_all_tables,
            no_backup_locks: cli.no_backup_locks,
            less_locking: cli.less_locking,
            trx_consistency_only: cli.trx_consistency_only,
            no_schemas: cli.no_schemas,
            all_tablespaces: cli.all_tablespaces,
            set_names: cli.set_names,
            databases: cli.database,
            tables_list: cli.tables_list,
            exec: cli.exec,
            stream: cli.stream,
        })
    }
}

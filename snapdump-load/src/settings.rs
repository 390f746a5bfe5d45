use clap::Parser;
use snapdump_common::settings::CommonSettings;

#[derive(Parser, Debug)]
#[command(name = "snapload", about = "Restore a streamed snapshot into a MySQL-family server")]
pub struct Cli {
    #[arg(long, env = "SNAPLOAD_CONFIG")]
    pub config: Option<String>,

    #[arg(long, short = 't')]
    pub threads: Option<u32>,

    #[arg(long)]
    pub skip_triggers: bool,

    #[arg(long)]
    pub skip_post: bool,

    #[arg(long)]
    pub no_data: bool,

    #[arg(long)]
    pub source_db: Option<String>,

    #[arg(long)]
    pub directory: Option<String>,

    #[arg(long, default_value_t = 4)]
    pub max_threads_per_table: u32,

    #[arg(long)]
    pub human_logs: bool,

    #[arg(long, env = "SNAPLOAD_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "SNAPLOAD_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "SNAPLOAD_USER")]
    pub user: Option<String>,

    #[arg(long, env = "SNAPLOAD_PASSWORD")]
    pub password: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoadSettings {
    pub common: CommonSettings,
    pub skip_triggers: bool,
    pub skip_post: bool,
    pub no_data: bool,
    pub source_db: Option<String>,
    pub max_threads_per_table: u32,
}

impl LoadSettings {
    pub fn from_cli(cli: Cli, mut common: CommonSettings) -> Self {
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
        LoadSettings {
            common,
            skip_triggers: cli.skip_triggers,
            skip_post: cli.skip_post,
            no_data: cli.no_data,
            source_db: cli.source_db,
            max_threads_per_table: cli.max_threads_per_table,
        }
    }
}

//! `snapload` -- restore a streamed snapshot into a MySQL-family server.

use clap::Parser;
use slog_scope::error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use snapdump_common::settings::{load_layered, CommonSettings};
use snapdump_load::executor::DefaultRestoreExecutor;
use snapdump_load::orchestrator;
use snapdump_load::settings::{Cli, LoadSettings};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let common: CommonSettings = match load_layered("SNAPLOAD", cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load settings: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let settings = LoadSettings::from_cli(cli, common);

    let _logging_guard = snapdump_common::logging::init(settings.common.human_logs, "snapload");

    let directory = PathBuf::from(&settings.common.directory);
    let executor = Arc::new(DefaultRestoreExecutor::new(
        settings.common.connection.clone(),
        directory,
        settings.source_db.clone(),
    ));

    let stdin = tokio::io::stdin();
    match orchestrator::run(stdin, settings, executor).await {
        Ok(outcome) if outcome.errors == 0 => ExitCode::SUCCESS,
        Ok(outcome) => {
            error!("restore completed with errors"; "count" => outcome.errors);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("restore failed"; "error" => %e);
            ExitCode::FAILURE
        }
    }
}

//! `snapdump` -- dump a consistent snapshot of a MySQL-family server.

use clap::Parser;
use slog_scope::error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use snapdump_common::settings::{load_layered, CommonSettings};
use snapdump_dump::default_executor::DefaultExecutor;
use snapdump_dump::orchestrator::{self, RunContext};
use snapdump_dump::settings::{Cli, DumpSettings};
use snapdump_filter::Filter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let common: CommonSettings = match load_layered("SNAPDUMP", cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = match DumpSettings::from_cli(cli, common) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("invalid settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _logging_guard = snapdump_common::logging::init(settings.common.human_logs, "snapdump");

    let mut filter_builder = Filter::builder();
    if !settings.tables_list.is_empty() {
        let names: Vec<String> = settings
            .tables_list
            .iter()
            .filter_map(|s| s.split_once('.').map(|(_, t)| t.to_string()))
            .collect();
        filter_builder = filter_builder.allowlist(names);
    }
    let filter = match filter_builder.build() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("invalid filter configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let directory = PathBuf::from(&settings.common.directory);
    let executor = Arc::new(if settings.stream {
        DefaultExecutor::new_streaming(settings.common.connection.clone(), directory)
    } else {
        DefaultExecutor::new(settings.common.connection.clone(), directory).with_exec(settings.exec.clone())
    });

    let ctx = RunContext {
        settings,
        filter,
        errors: Arc::new(AtomicU32::new(0)),
    };

    match orchestrator::run(ctx, executor).await {
        Ok(outcome) if outcome.errors == 0 => ExitCode::SUCCESS,
        Ok(outcome) => {
            error!("dump completed with errors"; "count" => outcome.errors);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("dump failed"; "error" => %e);
            ExitCode::FAILURE
        }
    }
}

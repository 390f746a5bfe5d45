//! Process-wide structured logger initialization.
//!
//! Every component logs through the global `slog` logger installed here
//! rather than `println!`/`eprintln!`. `human_logs` selects a colorized
//! terminal drain for interactive use; otherwise each record is emitted as
//! one JSON line, suited to log shipping from an unattended dump/restore
//! run.

use slog::{self, slog_o, Drain};
use slog_async;
use slog_envlogger;
use slog_mozlog_json::MozLogJson;
use slog_scope;
use slog_stdlog;
use slog_term;

/// Guard returned by `init`. Dropping it restores the previous global
/// logger; callers should hold it for the lifetime of `main`.
pub struct LoggingGuard {
    _scope_guard: slog_scope::GlobalLoggerGuard,
}

pub fn init(human_logs: bool, app_name: &'static str) -> LoggingGuard {
    let logger = if human_logs {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_envlogger::new(drain);
        let drain = slog_async::Async::new(drain).build().fuse();
        slog::Logger::root(drain, slog_o!())
    } else {
        let drain = MozLogJson::new(std::io::stdout())
            .logger_name(app_name.to_owned())
            .msg_type(format!("{}:log", app_name))
            .build()
            .fuse();
        let drain = slog_envlogger::new(drain);
        let drain = slog_async::Async::new(drain).build().fuse();
        slog::Logger::root(drain, slog_o!())
    };

    let scope_guard = slog_scope::set_global_logger(logger);
    slog_stdlog::init().ok();
    LoggingGuard {
        _scope_guard: scope_guard,
    }
}

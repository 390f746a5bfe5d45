//! Signal coordinator (C9): maps `SIGTERM` to graceful shutdown and,
//! outside daemon mode, `SIGINT` to a pause-and-confirm prompt.

use slog_scope::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};

use crate::diskspace::PauseGate;

#[derive(Clone)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        ShutdownFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs until the process should stop. `daemon` suppresses the
/// interactive `SIGINT` prompt, treating `SIGINT` as equivalent to
/// `SIGTERM` instead. `gates` are the same per-worker pause gates the
/// disk-space pauser uses; a non-daemon `SIGINT` holds all of them for
/// the duration of the confirmation prompt so no worker makes progress
/// while the human is being asked whether to abort.
pub async fn run(flag: ShutdownFlag, daemon: bool, gates: Vec<Arc<PauseGate>>) -> std::io::Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    loop {
        tokio::select! {
            _ = term.recv() => {
                info!("received SIGTERM, shutting down");
                flag.set();
                return Ok(());
            }
            _ = int.recv() => {
                if daemon {
                    info!("received SIGINT in daemon mode, shutting down");
                    flag.set();
                    return Ok(());
                }
                info!("received SIGINT, pausing workers for confirmation");
                let mut held = Vec::with_capacity(gates.len());
                for gate in &gates {
                    held.push(gate.lock_owned().await);
                }
                let abort = confirm_shutdown().await;
                held.clear();
                if abort {
                    flag.set();
                    return Ok(());
                }
                info!("resuming paused workers");
            }
        }
    }
}

async fn confirm_shutdown() -> bool {
    println!("Dump paused. Abort? [y/N] ");
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    match lines.next_line().await {
        Ok(Some(line)) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
        _ => false,
    }
}

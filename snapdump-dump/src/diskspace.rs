//! Disk-space pauser (C8): hysteresis between `pause_at` and `resume_at`,
//! gating workers through a per-worker pause mutex.

use slog_scope::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::interval;

use snapdump_common::util::free_space_mb;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Ok,
    Low,
}

/// One gate per worker. Workers call [`PauseGate::wait_if_paused`] at safe
/// points between jobs; the monitor task (or the signal coordinator, for
/// an interactive `SIGINT` pause) holds each gate's lock while paused,
/// which blocks the corresponding worker from progressing.
pub struct PauseGate(Arc<Mutex<()>>);

impl PauseGate {
    pub fn new() -> Self {
        PauseGate(Arc::new(Mutex::new(())))
    }

    pub async fn wait_if_paused(&self) {
        let _ = self.0.lock().await;
    }

    pub async fn lock_owned(&self) -> tokio::sync::OwnedMutexGuard<()> {
        self.0.clone().lock_owned().await
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DiskSpacePauser {
    directory: PathBuf,
    pause_at_mb: u64,
    resume_at_mb: u64,
    gates: Vec<Arc<PauseGate>>,
    shutdown: Arc<AtomicBool>,
}

impl DiskSpacePauser {
    pub fn new(directory: PathBuf, pause_at_mb: u64, resume_at_mb: u64, worker_count: usize) -> Self {
        DiskSpacePauser {
            directory,
            pause_at_mb,
            resume_at_mb: resume_at_mb.max(pause_at_mb),
            gates: (0..worker_count).map(|_| Arc::new(PauseGate::new())).collect(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn gate(&self, worker_index: usize) -> Arc<PauseGate> {
        self.gates[worker_index].clone()
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Runs until [`DiskSpacePauser::stop`] is called. Polls free space
    /// every 10 seconds, matching the reference design's poll interval.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(10));
        let mut state = State::Ok;
        let mut held: Vec<tokio::sync::OwnedMutexGuard<()>> = Vec::new();
        loop {
            ticker.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let free_mb = match free_space_mb(&self.directory) {
                Ok(mb) => mb,
                Err(e) => {
                    warn!("disk space check failed, assuming space is available"; "error" => %e);
                    continue;
                }
            };
            match state {
                State::Ok if free_mb < self.pause_at_mb => {
                    warn!("free space below pause threshold, pausing workers"; "free_mb" => free_mb, "pause_at_mb" => self.pause_at_mb);
                    held.clear();
                    for gate in &self.gates {
                        held.push(gate.lock_owned().await);
                    }
                    state = State::Low;
                }
                State::Low if free_mb > self.resume_at_mb => {
                    info!("free space above resume threshold, resuming workers"; "free_mb" => free_mb, "resume_at_mb" => self.resume_at_mb);
                    held.clear();
                    state = State::Ok;
                }
                _ => {}
            }
        }
    }
}

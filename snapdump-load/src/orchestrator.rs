//! Ties the restore-side components together: the demultiplexer feeds an
//! intermediate classification stage, which either resolves a file
//! immediately onto the scheduler or, if its dependency hasn't arrived
//! yet, requeues it until the stream's `END` sentinel is reached.

use slog_scope::{info, warn};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncRead;

use crate::classify::{classify, FileKind};
use crate::demux::{StreamDemux, END_OF_STREAM};
use crate::error::{LoadError, LoadResult};
use crate::executor::RestoreExecutor;
use crate::scheduler::Scheduler;
use crate::settings::LoadSettings;

fn table_key(path: &str) -> Option<(String, String)> {
    let base = path.split('-').next().unwrap_or(path);
    let base = base.split('.').collect::<Vec<_>>();
    if base.len() >= 2 {
        Some((base[0].to_string(), base[1].to_string()))
    } else {
        None
    }
}

/// Classification outcome: either the scheduler now has the job, or the
/// file is incomplete (its sibling schema file hasn't been classified
/// yet) and must be retried from the intermediate queue.
enum Classified {
    Resolved,
    Incomplete,
}

fn classify_and_schedule(
    path: &str,
    scheduler: &Scheduler,
    known_tables: &Mutex<HashMap<String, ()>>,
    settings: &LoadSettings,
) -> Result<Classified, LoadError> {
    let kind = classify(path);
    match kind {
        FileKind::SchemaCreate => {
            scheduler.enqueue_database(path.to_string());
        }
        FileKind::SchemaTable => {
            let (db, table) = table_key(path).ok_or_else(|| LoadError::ResumeUnsupported(path.to_string()))?;
            known_tables.lock().unwrap().insert(format!("{}.{}", db, table), ());
            scheduler.enqueue_structure(path.to_string(), db, table);
        }
        FileKind::SchemaView | FileKind::SchemaTrigger => {
            if kind == FileKind::SchemaTrigger && settings.skip_triggers {
                return Ok(Classified::Resolved);
            }
            scheduler.enqueue_post(path.to_string());
        }
        FileKind::SchemaPost => {
            if !settings.skip_post {
                scheduler.enqueue_post(path.to_string());
            }
        }
        FileKind::MetadataTable => {
            if let Some((db, table)) = table_key(path) {
                let key = format!("{}.{}", db, table);
                if !known_tables.lock().unwrap().contains_key(&key) {
                    return Ok(Classified::Incomplete);
                }
                scheduler.set_max_threads(&key, settings.max_threads_per_table);
            }
        }
        FileKind::Data => {
            if settings.no_data {
                return Ok(Classified::Resolved);
            }
            let (db, table) = table_key(path).ok_or_else(|| LoadError::ResumeUnsupported(path.to_string()))?;
            let key = format!("{}.{}", db, table);
            if !known_tables.lock().unwrap().contains_key(&key) {
                return Ok(Classified::Incomplete);
            }
            scheduler.enqueue_data(&key, path.to_string(), db, table);
        }
        FileKind::Resume => {
            return Err(LoadError::ResumeUnsupported(path.to_string()));
        }
        FileKind::Checksum | FileKind::MetadataGlobal | FileKind::Ignored | FileKind::Tablespace | FileKind::LoadData => {}
    }
    Ok(Classified::Resolved)
}

/// The intermediate re-queue (§4.11): drains files the demux hands it,
/// retrying `Incomplete` ones until either they resolve or the stream's
/// `END` token is reached -- convergence is guaranteed for any finite
/// stream where every dependency eventually arrives (§8).
pub fn drain_intermediate(
    files: VecDeque<String>,
    scheduler: &Scheduler,
    known_tables: &Mutex<HashMap<String, ()>>,
    settings: &LoadSettings,
) -> LoadResult<()> {
    let mut pending = files;
    loop {
        let mut next_round = VecDeque::new();
        let mut progressed = false;
        while let Some(path) = pending.pop_front() {
            if path == END_OF_STREAM {
                continue;
            }
            match classify_and_schedule(&path, scheduler, known_tables, settings)? {
                Classified::Resolved => progressed = true,
                Classified::Incomplete => next_round.push_back(path),
            }
        }
        if next_round.is_empty() {
            break;
        }
        if !progressed {
            warn!("intermediate queue stalled, dependencies never arrived"; "remaining" => next_round.len());
            break;
        }
        pending = next_round;
    }
    Ok(())
}

pub struct RunOutcome {
    pub errors: u32,
}

pub async fn run<R: AsyncRead + Unpin>(
    stream: R,
    settings: LoadSettings,
    executor: Arc<dyn RestoreExecutor>,
) -> LoadResult<RunOutcome> {
    let directory = PathBuf::from(&settings.common.directory);
    tokio::fs::create_dir_all(&directory)
        .await
        .map_err(|source| LoadError::OutputDirectory {
            path: directory.clone(),
            source,
        })?;

    let demux = StreamDemux::new(stream, directory.clone());
    let mut files = VecDeque::new();
    demux.run(|name| files.push_back(name)).await?;

    let scheduler = Arc::new(Scheduler::new(settings.max_threads_per_table));
    let known_tables = Mutex::new(HashMap::new());
    drain_intermediate(files, &scheduler, &known_tables, &settings)?;

    let errors = Arc::new(AtomicU32::new(0));
    let thread_count = settings.common.threads.max(1) as usize;
    for _ in 0..thread_count {
        scheduler.push_shutdown();
    }
    let mut handles = Vec::new();
    for i in 0..thread_count {
        let scheduler = scheduler.clone();
        let executor = executor.clone();
        let errors = errors.clone();
        handles.push(tokio::spawn(async move {
            run_worker(i, scheduler, executor, errors).await;
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    Ok(RunOutcome {
        errors: errors.load(Ordering::SeqCst),
    })
}

async fn run_worker(
    index: usize,
    scheduler: Arc<Scheduler>,
    executor: Arc<dyn RestoreExecutor>,
    errors: Arc<AtomicU32>,
) {
    loop {
        match scheduler.try_dequeue() {
            Some((job, table_key)) => {
                let is_shutdown = matches!(job, crate::scheduler::RestoreJob::Shutdown);
                if is_shutdown {
                    info!("restore worker shutting down"; "worker" => index);
                    return;
                }
                if let Err(e) = executor.apply(&job).await {
                    slog_scope::error!("restore job failed"; "worker" => index, "error" => %e);
                    errors.fetch_add(1, Ordering::SeqCst);
                }
                if let Some(key) = table_key {
                    scheduler.release_table_slot(&key);
                }
            }
            None => scheduler.wait_for_work().await,
        }
    }
}

//! Restore scheduler (C12): per-table job lists with a per-table
//! concurrency cap, and the database -> schema -> data -> post dequeue
//! priority.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;

use crate::classify::FileKind;

#[derive(Clone, Debug)]
pub enum RestoreJob {
    CreateDatabase { file: String },
    TableStructure { file: String, database: String, table: String },
    Data { file: String, database: String, table: String },
    Post { file: String },
    Shutdown,
}

struct TableState {
    pending_data: VecDeque<String>,
    max_threads: u32,
    current_threads: u32,
}

impl TableState {
    fn new(default_max_threads: u32) -> Self {
        TableState {
            pending_data: VecDeque::new(),
            max_threads: default_max_threads,
            current_threads: 0,
        }
    }
}

/// Owns every table's job list and concurrency counters behind a single
/// mutex. Contention here is intentionally cheap: enqueue/dequeue are O(1)
/// map + deque operations, not SQL.
pub struct Scheduler {
    tables: Mutex<HashMap<String, TableState>>,
    database_jobs: Mutex<VecDeque<RestoreJob>>,
    structure_jobs: Mutex<VecDeque<RestoreJob>>,
    post_jobs: Mutex<VecDeque<RestoreJob>>,
    /// Shutdown sentinels, one per worker. Kept in their own queue and
    /// consulted only once every other source is empty, so a worker never
    /// exits while real work (however briefly) is still pending.
    shutdown_count: Mutex<u32>,
    default_max_threads: u32,
    notify: Notify,
}

impl Scheduler {
    pub fn new(default_max_threads: u32) -> Self {
        Scheduler {
            tables: Mutex::new(HashMap::new()),
            database_jobs: Mutex::new(VecDeque::new()),
            structure_jobs: Mutex::new(VecDeque::new()),
            post_jobs: Mutex::new(VecDeque::new()),
            shutdown_count: Mutex::new(0),
            default_max_threads,
            notify: Notify::new(),
        }
    }

    fn wake(&self) {
        self.notify.notify_waiters();
    }

    pub fn set_max_threads(&self, table_key: &str, max_threads: u32) {
        let mut tables = self.tables.lock().unwrap();
        tables
            .entry(table_key.to_string())
            .or_insert_with(|| TableState::new(self.default_max_threads))
            .max_threads = max_threads;
    }

    pub fn enqueue_database(&self, file: String) {
        self.database_jobs.lock().unwrap().push_back(RestoreJob::CreateDatabase { file });
        self.wake();
    }

    pub fn enqueue_structure(&self, file: String, database: String, table: String) {
        self.structure_jobs
            .lock()
            .unwrap()
            .push_back(RestoreJob::TableStructure { file, database, table });
        self.wake();
    }

    pub fn enqueue_post(&self, file: String) {
        self.post_jobs.lock().unwrap().push_back(RestoreJob::Post { file });
        self.wake();
    }

    pub fn enqueue_data(&self, table_key: &str, file: String, database: String, table: String) {
        let mut tables = self.tables.lock().unwrap();
        tables
            .entry(table_key.to_string())
            .or_insert_with(|| TableState::new(self.default_max_threads))
            .pending_data
            .push_back(file);
        drop(tables);
        let _ = (database, table);
        self.wake();
    }

    pub fn push_shutdown(&self) {
        *self.shutdown_count.lock().unwrap() += 1;
        self.wake();
    }

    /// Dequeue priority: database job -> table-structure job -> a
    /// per-table data job under its concurrency cap -> any table's data
    /// job regardless of cap (the uncapped fallback keeps workers busy
    /// once every table that still has headroom is exhausted of pending
    /// jobs) -> post job -> a shutdown sentinel, claimed only once every
    /// other source above is confirmed empty. Returns `None` when nothing
    /// is presently available; the caller should await the next enqueue
    /// and retry.
    pub fn try_dequeue(&self) -> Option<(RestoreJob, Option<String>)> {
        if let Some(job) = self.database_jobs.lock().unwrap().pop_front() {
            return Some((job, None));
        }
        if let Some(job) = self.structure_jobs.lock().unwrap().pop_front() {
            return Some((job, None));
        }
        if let Some((job, key)) = self.next_table_data(true) {
            return Some((job, Some(key)));
        }
        if let Some((job, key)) = self.next_table_data(false) {
            return Some((job, Some(key)));
        }
        if let Some(job) = self.post_jobs.lock().unwrap().pop_front() {
            return Some((job, None));
        }
        let mut count = self.shutdown_count.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            return Some((RestoreJob::Shutdown, None));
        }
        None
    }

    fn next_table_data(&self, respect_cap: bool) -> Option<(RestoreJob, String)> {
        let mut tables = self.tables.lock().unwrap();
        for (key, state) in tables.iter_mut() {
            if respect_cap && state.current_threads >= state.max_threads {
                continue;
            }
            if let Some(file) = state.pending_data.pop_front() {
                state.current_threads += 1;
                let (database, table) = split_key(key);
                return Some((
                    RestoreJob::Data {
                        file,
                        database,
                        table,
                    },
                    key.clone(),
                ));
            }
        }
        None
    }

    pub fn release_table_slot(&self, table_key: &str) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(state) = tables.get_mut(table_key) {
            state.current_threads = state.current_threads.saturating_sub(1);
        }
        drop(tables);
        self.wake();
    }

    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }
}

fn split_key(key: &str) -> (String, String) {
    match key.split_once('.') {
        Some((d, t)) => (d.to_string(), t.to_string()),
        None => (key.to_string(), String::new()),
    }
}

/// Maps a classified file to the scheduling action the worker pool should
/// take. `None` means the file needs no worker-visible action at all
/// (`FileKind::Ignored`/`Tablespace` and friends).
pub fn kind_requires_worker(kind: FileKind) -> bool {
    !matches!(kind, FileKind::Ignored | FileKind::Tablespace | FileKind::LoadData)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_jobs_dequeue_before_structure_and_data() {
        let s = Scheduler::new(4);
        s.enqueue_structure("db.t-schema.sql".into(), "db".into(), "t".into());
        s.enqueue_data("db.t", "db.t.0.sql".into(), "db".into(), "t".into());
        s.enqueue_database("db-schema-create.sql".into());
        let (job, _) = s.try_dequeue().unwrap();
        assert!(matches!(job, RestoreJob::CreateDatabase { .. }));
        let (job, _) = s.try_dequeue().unwrap();
        assert!(matches!(job, RestoreJob::TableStructure { .. }));
        let (job, _) = s.try_dequeue().unwrap();
        assert!(matches!(job, RestoreJob::Data { .. }));
    }

    #[test]
    fn per_table_cap_is_respected_until_any_table_fallback() {
        let s = Scheduler::new(1);
        s.enqueue_data("db.t", "a.sql".into(), "db".into(), "t".into());
        s.enqueue_data("db.t", "b.sql".into(), "db".into(), "t".into());
        let (job, key) = s.try_dequeue().unwrap();
        assert!(matches!(job, RestoreJob::Data { .. }));
        let key = key.unwrap();
        // Second file for the same table is blocked by the cap until the
        // first slot is released.
        assert!(s.try_dequeue().is_none());
        s.release_table_slot(&key);
        let (job, _) = s.try_dequeue().unwrap();
        assert!(matches!(job, RestoreJob::Data { .. }));
    }
}

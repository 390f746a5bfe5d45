//! Ties the dump-side components together into a single run: guard,
//! lock, plan, execute, release, finalize. This is `start_dump` from the
//! reference design's design notes, restructured around an explicit
//! `RunContext` rather than process-global state.

use slog_scope::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

use snapdump_common::util::now_string;
use snapdump_filter::Filter;

use crate::diskspace::DiskSpacePauser;
use crate::error::{DumpError, DumpResult};
use crate::guard::{self, GuardSettings};
use crate::lock::{self, LockState};
use crate::metadata;
use crate::plan::{self, Job};
use crate::probe;
use crate::queue::JobQueue;
use crate::session;
use crate::settings::DumpSettings;
use crate::signal::{self, ShutdownFlag};
use crate::worker::{self, JobExecutor, NonInnodbGate};

pub struct RunContext {
    pub settings: DumpSettings,
    pub filter: Filter,
    pub errors: Arc<AtomicU32>,
}

pub struct RunOutcome {
    pub errors: u32,
}

pub async fn run(ctx: RunContext, executor: Arc<dyn JobExecutor>) -> DumpResult<RunOutcome> {
    if ctx.settings.stream && ctx.settings.exec.is_some() {
        return Err(DumpError::StreamAndExecConflict);
    }

    let directory = PathBuf::from(&ctx.settings.common.directory);
    tokio::fs::create_dir_all(&directory)
        .await
        .map_err(|source| DumpError::OutputDirectory {
            path: directory.clone(),
            source,
        })?;

    let started_at = now_string();
    let shutdown = ShutdownFlag::new();

    let mut main_conn = session::connect(&ctx.settings.common.connection, None)
        .await
        .map_err(DumpError::Common)?;

    let dialect = probe::probe(&mut main_conn).await.map_err(DumpError::Common)?;
    info!("detected server dialect"; "kind" => format!("{:?}", dialect.kind), "version" => %dialect.version_string);

    guard::wait_for_clear(
        &mut main_conn,
        &GuardSettings {
            threshold_secs: ctx.settings.long_query_guard_secs,
            retries: ctx.settings.long_query_retries,
            retry_interval_secs: ctx.settings.long_query_retry_interval_secs,
            kill_long_queries: ctx.settings.kill_long_queries,
        },
    )
    .await?;

    session::apply_session_variables(
        &mut main_conn,
        &ctx.settings.set_names,
        ctx.settings.tidb_snapshot.as_deref(),
    )
    .await
    .map_err(DumpError::Common)?;

    let thread_count = ctx.settings.common.threads.max(1) as usize;

    let mut lock_state = LockState::default();
    let mut second_conn = None;
    if ctx.settings.no_locks {
        warn!("running with --no-locks, snapshot consistency is not guaranteed");
    } else if ctx.settings.lock_all_tables {
        let tables = plan::plan_all_databases(&mut main_conn, &ctx.filter)
            .await
            .map_err(snapdump_common::CommonError::Connection)
            .map_err(DumpError::Common)?;
        lock::lock_all_tables(&mut main_conn, tables).await?;
        lock_state.table_locks_held = true;
    } else {
        use crate::probe::LockStrategy;
        let mut ddl_conn = if dialect.lock_strategy() == LockStrategy::Percona57TwoConnection {
            let c = session::connect(&ctx.settings.common.connection, None)
                .await
                .map_err(DumpError::Common)?;
            second_conn = Some(c);
            second_conn.as_mut()
        } else {
            None
        };
        lock_state = lock::acquire_ftwrl(
            &mut main_conn,
            ddl_conn.as_deref_mut(),
            &dialect,
            ctx.settings.no_backup_locks,
        )
        .await?;
    }

    if !ctx.settings.lock_all_tables && !ctx.settings.no_locks {
        session::start_consistent_snapshot(&mut main_conn, &dialect)
            .await
            .map_err(DumpError::Common)?;
    }

    let coords = metadata::capture_coordinates(&mut main_conn, dialect.kind == probe::ServerKind::MariaDb)
        .await
        .map_err(snapdump_common::CommonError::Connection)
        .map_err(DumpError::Common)?;

    let plan = if !ctx.settings.tables_list.is_empty() {
        let entries: Vec<(String, String)> = ctx
            .settings
            .tables_list
            .iter()
            .filter_map(|s| s.split_once('.'))
            .map(|(d, t)| (d.to_string(), t.to_string()))
            .collect();
        plan::plan_explicit_tables(&mut main_conn, &entries, &ctx.filter)
            .await
            .map_err(snapdump_common::CommonError::Connection)
            .map_err(DumpError::Common)?
    } else {
        let databases = if !ctx.settings.databases.is_empty() {
            ctx.settings.databases.clone()
        } else {
            plan::plan_all_databases(&mut main_conn, &ctx.filter)
                .await
                .map_err(snapdump_common::CommonError::Connection)
                .map_err(DumpError::Common)?
        };
        let mut merged = plan::Plan::default();
        for db in databases {
            let sub = plan::plan_database(&mut main_conn, &db, &ctx.filter, ctx.settings.no_schemas)
                .await
                .map_err(snapdump_common::CommonError::Connection)
                .map_err(DumpError::Common)?;
            merged.databases.extend(sub.databases);
            merged.tables.extend(sub.tables);
        }
        merged
    };

    // The less-locking queue exists only when less-locking is requested,
    // locking isn't disabled, the trx-consistency-only early release isn't
    // already handling it, and `--lock-all-tables` hasn't already taken a
    // global per-table lock on everything up front.
    let less_locking_active = ctx.settings.less_locking
        && !ctx.settings.no_locks
        && !ctx.settings.trx_consistency_only
        && !ctx.settings.lock_all_tables;

    let mut jobs = plan::jobs_for_plan(&plan, less_locking_active, ctx.settings.no_schemas);
    if ctx.settings.all_tablespaces {
        jobs.push(Job::DumpTablespaces);
    }
    if let Some(days) = ctx.settings.updated_since_days {
        write_not_updated_tables(&directory, &plan, &mut main_conn, days).await?;
    }
    let non_innodb_count = plan
        .tables
        .iter()
        .filter(|t| t.engine == snapdump_common::model::EngineClass::NonTransactional)
        .count() as u32;

    let queue = Arc::new(JobQueue::new());
    queue.push_many(jobs).await;
    for _ in 0..thread_count {
        queue.push(Job::Shutdown).await;
    }

    let less_locking_queue = if less_locking_active {
        let items: Vec<((String, String), u64)> = plan::non_transactional_tables(&plan)
            .into_iter()
            .map(|(db, table, length)| ((db, table), length))
            .collect();
        let buckets = worker::bin_pack_by_length(items, thread_count);
        let ll_queue = Arc::new(JobQueue::new());
        for bucket in buckets {
            ll_queue.push(Job::DumpNonTransactionalBucket { tables: bucket }).await;
        }
        Some(ll_queue)
    } else {
        None
    };

    let pauser = ctx
        .settings
        .common
        .pause_at_mb
        .zip(ctx.settings.common.resume_at_mb)
        .map(|(pause, resume)| Arc::new(DiskSpacePauser::new(directory.clone(), pause, resume, thread_count)));
    let disk_task = pauser.clone().map(|p| tokio::spawn(p.run()));

    let ready = Arc::new(Barrier::new(thread_count + 1));
    let non_innodb_gate = NonInnodbGate::new(non_innodb_count);
    let mut handles = Vec::new();
    let mut gates = Vec::with_capacity(thread_count);
    for i in 0..thread_count {
        let gate = pauser
            .as_ref()
            .map(|p| p.gate(i))
            .unwrap_or_else(|| Arc::new(crate::diskspace::PauseGate::new()));
        gates.push(gate.clone());
        handles.push(tokio::spawn(worker::run_worker(
            i,
            queue.clone(),
            less_locking_queue.clone(),
            executor.clone(),
            ready.clone(),
            gate,
            non_innodb_gate.clone(),
            shutdown.clone(),
            ctx.errors.clone(),
        )));
    }
    ready.wait().await;

    let signal_task = tokio::spawn(signal::run(
        shutdown.clone(),
        ctx.settings.common.connection.socket.is_some(),
        gates,
    ));

    if ctx.settings.trx_consistency_only && !ctx.settings.no_locks && !ctx.settings.lock_all_tables {
        if lock_state.ddl_lock_held {
            if let Some(second) = second_conn.as_mut() {
                lock::release_ddl_lock(second, &dialect).await?;
            } else {
                lock::release_ddl_lock(&mut main_conn, &dialect).await?;
            }
        }
        if lock_state.ftwrl_held {
            lock::release_ftwrl(&mut main_conn).await?;
        }
        lock_state = LockState::default();
    } else if !ctx.settings.no_locks && !ctx.settings.lock_all_tables {
        // Default (non-trx-consistency-only) FTWRL mode: the spec's early
        // release fires once every non-transactional table is done,
        // rather than waiting for the whole run to finish.
        non_innodb_gate.wait_until_done().await;
        if lock_state.ddl_lock_held {
            if let Some(second) = second_conn.as_mut() {
                lock::release_ddl_lock(second, &dialect).await?;
            } else {
                lock::release_ddl_lock(&mut main_conn, &dialect).await?;
            }
        }
        if lock_state.ftwrl_held {
            lock::release_ftwrl(&mut main_conn).await?;
        }
        lock_state = LockState::default();
    }

    for handle in handles {
        let _ = handle.await;
    }

    if lock_state.table_locks_held {
        lock::release_ftwrl(&mut main_conn).await?;
    }

    if let Some(p) = &pauser {
        p.stop();
    }
    if let Some(task) = disk_task {
        let _ = task.await;
    }
    signal_task.abort();

    metadata::write_metadata(&directory, &coords, &started_at).await?;

    Ok(RunOutcome {
        errors: ctx.errors.load(Ordering::SeqCst),
    })
}

/// Supplemental `--updated-since` feature: cross-references each planned
/// table's `information_schema.TABLES.UPDATE_TIME` against the threshold
/// and writes the stale ones to a `not_updated_tables` file so a caller
/// can skip re-dumping data that hasn't changed recently. Views have no
/// `UPDATE_TIME` and are left out of the comparison entirely.
async fn write_not_updated_tables(
    directory: &std::path::Path,
    plan: &plan::Plan,
    conn: &mut mysql_async::Conn,
    days: u32,
) -> DumpResult<()> {
    use mysql_async::prelude::Queryable;

    let mut stale = Vec::new();
    for table in &plan.tables {
        if table.engine == snapdump_common::model::EngineClass::View {
            continue;
        }
        let row: Option<(Option<String>,)> = conn
            .exec_first(
                "SELECT UPDATE_TIME FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
                (table.database.clone(), table.name.clone()),
            )
            .await
            .map_err(|source| DumpError::Common(snapdump_common::CommonError::Connection(source)))?;

        let is_stale = match row.and_then(|(update_time,)| update_time) {
            None => true,
            Some(update_time) => days_since(&update_time) >= days,
        };
        if is_stale {
            stale.push(format!("{}.{}", table.database, table.name));
        }
    }

    if stale.is_empty() {
        return Ok(());
    }

    let mut body = String::new();
    for name in &stale {
        body.push_str(name);
        body.push('\n');
    }
    tokio::fs::write(directory.join("not_updated_tables"), body)
        .await
        .map_err(DumpError::Metadata)?;
    Ok(())
}

/// Parses a `DATETIME`-shaped `UPDATE_TIME` string (`YYYY-MM-DD HH:MM:SS`)
/// and returns the whole number of days between it and now. A value that
/// doesn't parse is treated as infinitely stale, since a missing/garbled
/// timestamp gives no reason to assume the table is fresh.
fn days_since(update_time: &str) -> u32 {
    use chrono::NaiveDateTime;
    match NaiveDateTime::parse_from_str(update_time, "%Y-%m-%d %H:%M:%S") {
        Ok(parsed) => {
            let now = chrono::Local::now().naive_local();
            let delta = now.signed_duration_since(parsed);
            delta.num_days().max(0) as u32
        }
        Err(_) => u32::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_since_recent_timestamp_is_zero() {
        let now = chrono::Local::now().naive_local().format("%Y-%m-%d %H:%M:%S").to_string();
        assert_eq!(days_since(&now), 0);
    }

    #[test]
    fn days_since_unparseable_timestamp_is_max() {
        assert_eq!(days_since("not-a-timestamp"), u32::MAX);
    }
}

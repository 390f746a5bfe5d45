//! Long-query guard (C5): blocks dump start until no qualifying query has
//! been running longer than the configured threshold.

use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Row};
use slog_scope::{info, warn};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{DumpError, DumpResult};

#[derive(Clone, Copy, Debug)]
pub struct GuardSettings {
    pub threshold_secs: u64,
    pub retries: u32,
    pub retry_interval_secs: u64,
    pub kill_long_queries: bool,
}

#[derive(Debug)]
struct ProcessRow {
    id: u64,
    user: String,
    command: String,
    time: i64,
}

impl ProcessRow {
    /// `SHOW PROCESSLIST` columns are positional (`Id, User, Host, db,
    /// Command, Time, State, Info`); named lookup isn't guaranteed across
    /// every dialect so the relevant columns are pulled by index.
    fn from_row(mut row: Row) -> Option<ProcessRow> {
        Some(ProcessRow {
            id: row.take(0)?,
            user: row.take(1)?,
            command: row.take(4)?,
            time: row.take::<Option<i64>, _>(5)?.unwrap_or(0),
        })
    }
}

async fn offenders(conn: &mut Conn, threshold_secs: u64) -> Result<Vec<ProcessRow>, mysql_async::Error> {
    let rows: Vec<Row> = conn.query("SHOW PROCESSLIST").await?;
    Ok(rows
        .into_iter()
        .filter_map(ProcessRow::from_row)
        .filter(|r| r.command == "Query" && r.user != "system user" && r.time > threshold_secs as i64)
        .collect())
}

/// Polls `SHOW PROCESSLIST` until no offending query remains, killing
/// offenders when configured to, and giving up after `retries` empty-handed
/// polls spaced `retry_interval_secs` apart.
pub async fn wait_for_clear(conn: &mut Conn, settings: &GuardSettings) -> DumpResult<()> {
    for attempt in 0..=settings.retries {
        let mut found = offenders(conn, settings.threshold_secs).await.unwrap_or_default();
        if found.is_empty() {
            return Ok(());
        }
        if settings.kill_long_queries {
            for row in found.drain(..) {
                match conn.query_drop(format!("KILL {}", row.id)).await {
                    Ok(()) => info!("killed long-running query"; "id" => row.id, "age_secs" => row.time),
                    Err(e) => warn!("failed to kill long-running query"; "id" => row.id, "error" => %e),
                }
            }
        } else {
            warn!("long queries still running"; "count" => found.len(), "attempt" => attempt);
        }
        if attempt < settings.retries {
            sleep(Duration::from_secs(settings.retry_interval_secs)).await;
        }
    }
    Err(DumpError::LongQueryGuardExhausted {
        retries: settings.retries,
    })
}

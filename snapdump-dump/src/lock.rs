//! Lock controller (C4): acquires and releases the global/backup/DDL and
//! per-table locks appropriate to the probed dialect, and supports the
//! early-release paths for `trx_consistency_only` and less-locking.

use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Error as MyError};
use slog_scope::{info, warn};

use crate::error::{DumpError, DumpResult};
use crate::probe::{Dialect, LockStrategy};

const MAX_LOCK_ALL_ATTEMPTS: u32 = 4;

/// What the controller is holding right now, so release can always mirror
/// acquisition regardless of which exit path (success, fatal error,
/// signal) triggered it.
#[derive(Default)]
pub struct LockState {
    pub ftwrl_held: bool,
    pub ddl_lock_held: bool,
    pub table_locks_held: bool,
}

pub enum LockMode {
    Ftwrl { no_backup_locks: bool },
    LockAllTables,
    NoLocks,
}

/// Acquires `FLUSH TABLES WITH READ LOCK` plus, unless disabled, the
/// server-specific DDL/backup lock. `ddl_conn` is a second connection for
/// dialects whose backup lock must be released from a session other than
/// the one holding FTWRL (Percona 5.7).
pub async fn acquire_ftwrl(
    main: &mut Conn,
    ddl_conn: Option<&mut Conn>,
    dialect: &Dialect,
    no_backup_locks: bool,
) -> DumpResult<LockState> {
    if let Err(e) = main.query_drop("FLUSH NO_WRITE_TO_BINLOG TABLES").await {
        warn!("FLUSH NO_WRITE_TO_BINLOG TABLES failed, continuing"; "error" => %e);
    }
    main.query_drop("FLUSH TABLES WITH READ LOCK")
        .await
        .map_err(DumpError::GlobalLockFailed)?;
    let mut state = LockState {
        ftwrl_held: true,
        ..Default::default()
    };

    if no_backup_locks {
        return Ok(state);
    }

    let lock_conn = ddl_conn.unwrap_or(main);
    match dialect.lock_strategy() {
        LockStrategy::InstanceBackupLock => {
            lock_conn
                .query_drop("LOCK INSTANCE FOR BACKUP")
                .await
                .map_err(DumpError::GlobalLockFailed)?;
            state.ddl_lock_held = true;
        }
        LockStrategy::Percona57TwoConnection => {
            lock_conn
                .query_drop("LOCK TABLES FOR BACKUP")
                .await
                .map_err(DumpError::GlobalLockFailed)?;
            lock_conn
                .query_drop("LOCK BINLOG FOR BACKUP")
                .await
                .map_err(DumpError::GlobalLockFailed)?;
            state.ddl_lock_held = true;
        }
        LockStrategy::MariaDbBackupStage => {
            for stage in ["START", "FLUSH", "BLOCK_DDL", "BLOCK_COMMIT"] {
                lock_conn
                    .query_drop(format!("BACKUP STAGE {}", stage))
                    .await
                    .map_err(DumpError::GlobalLockFailed)?;
            }
            state.ddl_lock_held = true;
        }
        LockStrategy::TiDbSnapshotOnly | LockStrategy::None => {}
    }
    Ok(state)
}

pub async fn release_ddl_lock(conn: &mut Conn, dialect: &Dialect) -> DumpResult<()> {
    match dialect.lock_strategy() {
        LockStrategy::InstanceBackupLock => {
            conn.query_drop("UNLOCK INSTANCE").await.ok();
        }
        LockStrategy::Percona57TwoConnection => {
            conn.query_drop("UNLOCK TABLES").await.ok();
            conn.query_drop("UNLOCK BINLOG").await.ok();
        }
        LockStrategy::MariaDbBackupStage => {
            conn.query_drop("BACKUP STAGE END").await.ok();
        }
        LockStrategy::TiDbSnapshotOnly | LockStrategy::None => {}
    }
    Ok(())
}

pub async fn release_ftwrl(conn: &mut Conn) -> DumpResult<()> {
    conn.query_drop("UNLOCK TABLES").await.ok();
    Ok(())
}

/// Parses the table name MySQL reports in a failed `LOCK TABLE` error,
/// e.g. `Table 'db.t' doesn't exist`. Returns `None` if the message
/// doesn't match the expected shape, in which case the caller should treat
/// the whole attempt as unrecoverable.
fn extract_offending_table(err: &MyError) -> Option<String> {
    extract_offending_table_from_message(&err.to_string())
}

fn extract_offending_table_from_message(msg: &str) -> Option<String> {
    let start = msg.find('\'')?;
    let rest = &msg[start + 1..];
    let end = rest.find('\'')?;
    let full = &rest[..end];
    full.rsplit('.').next().map(|s| s.to_string())
}

/// `LOCK-ALL` mode: lock every in-scope table in one statement. Mirrors
/// the reference design's table-name-only match against the allowlist --
/// intentionally preserved even though it means a table name from one
/// schema can match an allowlist entry meant for another schema's table
/// of the same name.
pub async fn lock_all_tables(conn: &mut Conn, mut tables: Vec<String>) -> DumpResult<Vec<String>> {
    for attempt in 1..=MAX_LOCK_ALL_ATTEMPTS {
        if tables.is_empty() {
            return Ok(tables);
        }
        let clause = tables
            .iter()
            .map(|t| format!("{} READ", t))
            .collect::<Vec<_>>()
            .join(", ");
        match conn.query_drop(format!("LOCK TABLE {}", clause)).await {
            Ok(()) => {
                info!("locked all tables"; "count" => tables.len(), "attempt" => attempt);
                return Ok(tables);
            }
            Err(e) => {
                if let Some(offending) = extract_offending_table(&e) {
                    warn!("table vanished before lock, retrying without it"; "table" => %offending, "attempt" => attempt);
                    tables.retain(|t| !t.eq_ignore_ascii_case(&offending));
                    continue;
                }
                return Err(DumpError::LockAllTablesExhausted { attempts: attempt });
            }
        }
    }
    Err(DumpError::LockAllTablesExhausted {
        attempts: MAX_LOCK_ALL_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_offending_table_reads_quoted_name() {
        assert_eq!(
            extract_offending_table_from_message("Table 'mydb.orders' doesn't exist"),
            Some("orders".to_string())
        );
    }

    #[test]
    fn extract_offending_table_returns_none_for_unexpected_message() {
        assert_eq!(extract_offending_table_from_message("connection reset"), None);
    }
}

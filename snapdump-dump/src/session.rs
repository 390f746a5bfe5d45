//! Connection session setup (C2): session variables, TiDB snapshot
//! binding, the legacy dummy-table read for pre-4.1.8 servers, and
//! starting the consistent-snapshot transaction.

use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder};
use snapdump_common::settings::ConnectionSettings;
use snapdump_common::CommonError;

use crate::probe::Dialect;

pub fn build_opts(conn: &ConnectionSettings, database: Option<&str>) -> Opts {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(conn.host.clone())
        .tcp_port(conn.port)
        .user(Some(conn.user.clone()))
        .pass(conn.password.clone());
    if let Some(db) = database {
        builder = builder.db_name(Some(db.to_owned()));
    }
    if let Some(socket) = &conn.socket {
        builder = builder.socket(Some(socket.clone()));
    }
    builder.into()
}

pub async fn connect(conn: &ConnectionSettings, database: Option<&str>) -> Result<Conn, CommonError> {
    Conn::new(build_opts(conn, database))
        .await
        .map_err(CommonError::Connection)
}

/// Applies the session variables every worker connection needs before it
/// participates in the snapshot: a binary `SET NAMES`, `information_schema`
/// stats expiry disabled where supported, and `REPEATABLE READ` isolation.
pub async fn apply_session_variables(
    conn: &mut Conn,
    set_names: &str,
    tidb_snapshot: Option<&str>,
) -> Result<(), CommonError> {
    conn.query_drop(format!("SET NAMES {}", set_names))
        .await
        .map_err(|e| CommonError::SessionVariable {
            name: "SET NAMES",
            source: e,
        })?;
    // Best-effort: not every server exposes this variable.
    let _ = conn
        .query_drop("SET SESSION information_schema_stats_expiry = 0")
        .await;
    conn.query_drop("SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ")
        .await
        .map_err(|e| CommonError::SessionVariable {
            name: "TRANSACTION ISOLATION LEVEL",
            source: e,
        })?;
    if let Some(snapshot) = tidb_snapshot {
        conn.query_drop(format!("SET SESSION tidb_snapshot = '{}'", snapshot))
            .await
            .map_err(|e| CommonError::SessionVariable {
                name: "tidb_snapshot",
                source: e,
            })?;
    }
    Ok(())
}

/// Binds the snapshot on servers that predate `START TRANSACTION WITH
/// CONSISTENT SNAPSHOT` (or that need a storage-engine-specific dummy
/// read) by performing a throwaway read inside the transaction, per
/// [`Dialect::needs_dummy_snapshot_read`] and [`Dialect::is_tokudb`].
pub async fn bind_legacy_snapshot(conn: &mut Conn, tokudb: bool) -> Result<(), CommonError> {
    let (table, engine) = if tokudb {
        ("__snapdump_dummy_tokudb", "TokuDB")
    } else {
        ("__snapdump_dummy", "InnoDB")
    };
    conn.query_drop(format!(
        "CREATE TEMPORARY TABLE IF NOT EXISTS {} (id INT) ENGINE={}",
        table, engine
    ))
    .await
    .map_err(CommonError::Connection)?;
    conn.query_drop(format!("SELECT * FROM {} LIMIT 1", table))
        .await
        .map_err(CommonError::Connection)?;
    Ok(())
}

/// Starts the main snapshot transaction. Skipped entirely under
/// `lock_all_tables`, where the explicit per-table read locks would
/// otherwise be released implicitly by `START TRANSACTION`.
pub async fn start_consistent_snapshot(conn: &mut Conn, dialect: &Dialect) -> Result<(), CommonError> {
    if dialect.needs_dummy_snapshot_read() {
        bind_legacy_snapshot(conn, false).await?;
    }
    if dialect.is_tokudb {
        bind_legacy_snapshot(conn, true).await?;
    }
    conn.query_drop("START TRANSACTION /*!40108 WITH CONSISTENT SNAPSHOT */")
        .await
        .map_err(CommonError::Connection)
}

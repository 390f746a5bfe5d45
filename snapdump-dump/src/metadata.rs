//! Metadata writer (C10): records snapshot coordinates and start/finish
//! timestamps to `metadata`, staged through `metadata.partial` so a reader
//! never observes a half-written file.

use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Row};
use slog_scope::warn;
use snapdump_common::model::{SlaveCoordinate, SnapshotCoordinates};
use snapdump_common::util::now_string;
use std::fmt::Write as _;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Reads `SHOW MASTER STATUS` and `SHOW SLAVE STATUS` (or `SHOW ALL SLAVES
/// STATUS` when multi-source replication is detected via
/// `@@default_master_connection`). GTID comes from the 5th column of
/// `SHOW MASTER STATUS` on MySQL/Percona, or `@@gtid_binlog_pos` on
/// MariaDB.
pub async fn capture_coordinates(conn: &mut Conn, is_mariadb: bool) -> Result<SnapshotCoordinates, mysql_async::Error> {
    let mut coords = SnapshotCoordinates::default();

    let master_rows: Vec<Row> = conn.query("SHOW MASTER STATUS").await.unwrap_or_default();
    if let Some(row) = master_rows.into_iter().next() {
        coords.master_log_file = row.get(0);
        coords.master_log_pos = row.get(1);
        coords.master_gtid = if is_mariadb {
            conn.query_first("SELECT @@gtid_binlog_pos").await.unwrap_or(None)
        } else {
            row.get(4)
        };
    }

    let multisource: Option<String> = conn
        .query_first("SELECT @@default_master_connection")
        .await
        .unwrap_or(None);

    let is_multisource = multisource.as_deref().map(|s| !s.is_empty()).unwrap_or(false);
    let slave_rows: Vec<Row> = if is_multisource {
        conn.query("SHOW ALL SLAVES STATUS").await.unwrap_or_default()
    } else {
        conn.query("SHOW SLAVE STATUS").await.unwrap_or_default()
    };
    if is_multisource && slave_rows.len() > 1 {
        warn!("multiple replication sources active"; "count" => slave_rows.len());
    }
    for row in slave_rows {
        coords.slaves.push(SlaveCoordinate {
            connection_name: row.get("Connection_name"),
            host: row.get("Master_Host").unwrap_or_default(),
            log_file: row.get("Relay_Master_Log_File").unwrap_or_default(),
            log_pos: row.get("Exec_Master_Log_Pos").unwrap_or(0),
            gtid: row.get("Gtid_Slave_Pos"),
        });
    }
    Ok(coords)
}

fn render(coords: &SnapshotCoordinates, started_at: &str, finished_at: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Started dump at: {}", started_at);
    if let Some(file) = &coords.master_log_file {
        let _ = writeln!(out, "SHOW MASTER STATUS:");
        let _ = writeln!(out, "    Log: {}", file);
        let _ = writeln!(out, "    Pos: {}", coords.master_log_pos.unwrap_or(0));
        let _ = writeln!(out, "    GTID:{}", coords.master_gtid.clone().unwrap_or_default());
    }
    for slave in &coords.slaves {
        let _ = writeln!(out, "SHOW SLAVE STATUS:");
        if let Some(name) = &slave.connection_name {
            let _ = writeln!(out, "    Connection name: {}", name);
        }
        let _ = writeln!(out, "    Host: {}", slave.host);
        let _ = writeln!(out, "    Log: {}", slave.log_file);
        let _ = writeln!(out, "    Pos: {}", slave.log_pos);
        let _ = writeln!(out, "    GTID:{}", slave.gtid.clone().unwrap_or_default());
    }
    let _ = writeln!(out, "Finished dump at: {}", finished_at);
    out
}

pub async fn write_metadata(directory: &Path, coords: &SnapshotCoordinates, started_at: &str) -> std::io::Result<()> {
    let partial = directory.join("metadata.partial");
    let finished_at = now_string();
    let contents = render(coords, started_at, &finished_at);
    let mut file = fs::File::create(&partial).await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;
    fs::rename(&partial, directory.join("metadata")).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_master_and_slave_blocks() {
        let mut coords = SnapshotCoordinates::default();
        coords.master_log_file = Some("binlog.000123".into());
        coords.master_log_pos = Some(456);
        coords.master_gtid = Some("0-1-99".into());
        coords.slaves.push(SlaveCoordinate {
            connection_name: Some("replica1".into()),
            host: "10.0.0.2".into(),
            log_file: "binlog.000100".into(),
            log_pos: 10,
            gtid: None,
        });
        let out = render(&coords, "2026-07-28 12:00:00", "2026-07-28 12:00:05");
        assert!(out.contains("Log: binlog.000123"));
        assert!(out.contains("Connection name: replica1"));
        assert!(out.contains("Finished dump at: 2026-07-28 12:00:05"));
    }

    #[test]
    fn render_omits_master_block_when_absent_but_keeps_slave_block() {
        // Mirrors the reference behavior of still emitting a SLAVE block
        // even when SHOW MASTER STATUS returned no rows.
        let mut coords = SnapshotCoordinates::default();
        coords.slaves.push(SlaveCoordinate {
            connection_name: None,
            host: "10.0.0.3".into(),
            log_file: "binlog.5".into(),
            log_pos: 1,
            gtid: None,
        });
        let out = render(&coords, "t0", "t1");
        assert!(!out.contains("SHOW MASTER STATUS"));
        assert!(out.contains("SHOW SLAVE STATUS"));
    }
}

//! Data model shared by both the dump and restore workspaces.
//!
//! The dump-side planner and the restore-side scheduler each keep their
//! own, differently-shaped `Table` bookkeeping (one tracks engine class and
//! approximate length, the other tracks per-table worker concurrency), so
//! only the pieces that are genuinely identical on both sides live here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a table's storage engine, relevant to lock strategy
/// selection (transactional tables need no explicit lock once a snapshot
/// transaction has started; non-transactional ones do).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineClass {
    Transactional,
    NonTransactional,
    View,
}

/// A fully-qualified `database.table` reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl TableRef {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        TableRef {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// A single replica's reported position, as read from `SHOW SLAVE STATUS`
/// / `SHOW ALL SLAVES STATUS`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SlaveCoordinate {
    pub connection_name: Option<String>,
    pub host: String,
    pub log_file: String,
    pub log_pos: u64,
    pub gtid: Option<String>,
}

/// Master/slave binlog coordinates captured at snapshot time, written to
/// the metadata file before data extraction begins.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnapshotCoordinates {
    pub master_log_file: Option<String>,
    pub master_log_pos: Option<u64>,
    pub master_gtid: Option<String>,
    pub slaves: Vec<SlaveCoordinate>,
}

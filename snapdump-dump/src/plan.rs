//! Work planner (C6): enumerates databases/tables in scope and turns them
//! into the job list the worker pool (C7) consumes.

use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Row};
use snapdump_common::model::EngineClass;
use snapdump_filter::Filter;
use std::collections::HashMap;
use std::sync::Mutex;

/// One database encountered during planning. The only mutable field is
/// `schema_dumped`, which transitions false -> true exactly once, under
/// this struct's own mutex, guaranteeing at-most-once schema dump even
/// when multiple tables belonging to the same database are discovered
/// concurrently.
#[derive(Debug)]
pub struct Database {
    pub name: String,
    schema_dumped: Mutex<bool>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Database {
            name: name.into(),
            schema_dumped: Mutex::new(false),
        }
    }

    /// Returns `true` the first time it's called for this database, and
    /// `false` on every subsequent call.
    pub fn claim_schema_dump(&self) -> bool {
        let mut dumped = self.schema_dumped.lock().unwrap();
        if *dumped {
            false
        } else {
            *dumped = true;
            true
        }
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    pub database: String,
    pub name: String,
    pub engine: EngineClass,
    pub approx_data_length: u64,
}

#[derive(Debug, Clone)]
pub enum Job {
    DumpSchema(String),
    /// `SHOW CREATE TABLE` for one table, written to `{db}.{table}-schema.sql`.
    DumpTableSchema { database: String, table: String },
    DumpTableData {
        database: String,
        table: String,
        chunk: u32,
        /// Set when this table's engine isn't transactional, so the worker
        /// reports completion to the less-locking early-release gate.
        is_non_transactional: bool,
    },
    DumpView { database: String, view: String },
    DumpTrigger { database: String, table: String },
    DumpTablespaces,
    /// Less-locking mode: one bin-packed bucket of non-transactional
    /// tables assigned to a single worker, locked/dumped/unlocked as a
    /// unit instead of going through the main queue.
    DumpNonTransactionalBucket { tables: Vec<(String, String)> },
    Shutdown,
}

#[derive(Default)]
pub struct Plan {
    pub databases: HashMap<String, Database>,
    pub tables: Vec<Table>,
}

fn engine_and_comment_columns(row: &Row) -> (Option<usize>, Option<usize>) {
    let mut engine_idx = None;
    let mut comment_idx = None;
    for (idx, column) in row.columns_ref().iter().enumerate() {
        match column.name_str().as_ref() {
            "Engine" => engine_idx = Some(idx),
            "Comment" => comment_idx = Some(idx),
            _ => {}
        }
    }
    (engine_idx, comment_idx)
}

fn classify(row: &Row) -> Option<(String, EngineClass, u64)> {
    let (engine_idx, comment_idx) = engine_and_comment_columns(row);
    let name: String = row.get("Name")?;
    let engine: Option<String> = engine_idx.and_then(|i| row.get(i));
    let comment: Option<String> = comment_idx.and_then(|i| row.get(i));
    let data_length: u64 = row.get("Data_length").unwrap_or(0);

    let class = match (&engine, comment.as_deref()) {
        (None, _) | (_, Some("VIEW")) => EngineClass::View,
        (Some(e), _) if e.eq_ignore_ascii_case("InnoDB") || e.eq_ignore_ascii_case("TokuDB") => {
            EngineClass::Transactional
        }
        _ => EngineClass::NonTransactional,
    };
    Some((name, class, data_length))
}

/// Mode 1: an explicit `database.table` list. Each entry is resolved via
/// `SHOW TABLE STATUS FROM db LIKE 'table'`.
pub async fn plan_explicit_tables(
    conn: &mut Conn,
    entries: &[(String, String)],
    filter: &Filter,
) -> Result<Plan, mysql_async::Error> {
    let mut plan = Plan::default();
    for (db, table) in entries {
        if !filter.accept(db, Some(table)) {
            continue;
        }
        let rows: Vec<Row> = conn
            .query(format!("SHOW TABLE STATUS FROM `{}` LIKE '{}'", db, table))
            .await?;
        let database = plan
            .databases
            .entry(db.clone())
            .or_insert_with(|| Database::new(db.clone()));
        let _ = database;
        for row in rows {
            if let Some((name, engine, length)) = classify(&row) {
                plan.tables.push(Table {
                    database: db.clone(),
                    name,
                    engine,
                    approx_data_length: length,
                });
            }
        }
    }
    Ok(plan)
}

/// Mode 3: no explicit scope given -- enumerate every database via `SHOW
/// DATABASES`, skipping the server's own schemas, then fall through to
/// per-database table enumeration exactly as mode 2 would.
pub async fn plan_all_databases(conn: &mut Conn, filter: &Filter) -> Result<Vec<String>, mysql_async::Error> {
    const SKIP: &[&str] = &["information_schema", "performance_schema", "data_dictionary"];
    let names: Vec<String> = conn.query("SHOW DATABASES").await?;
    Ok(names
        .into_iter()
        .filter(|n| !SKIP.contains(&n.as_str()) && filter.accept(n, None))
        .collect())
}

/// Mode 2: expand one database into its constituent tables/views.
pub async fn plan_database(
    conn: &mut Conn,
    database: &str,
    filter: &Filter,
    no_schemas: bool,
) -> Result<Plan, mysql_async::Error> {
    let mut plan = Plan::default();
    let db_entry = Database::new(database.to_string());
    let rows: Vec<Row> = conn.query(format!("SHOW TABLE STATUS FROM `{}`", database)).await?;
    for row in rows {
        if let Some((name, engine, length)) = classify(&row) {
            if !filter.accept(database, Some(&name)) {
                continue;
            }
            plan.tables.push(Table {
                database: database.to_string(),
                name,
                engine,
                approx_data_length: length,
            });
        }
    }
    if !no_schemas {
        plan.databases.insert(database.to_string(), db_entry);
    }
    Ok(plan)
}

/// Builds the job list from a completed plan. `DumpSchema` is emitted at
/// most once per database regardless of how many tables it has, using
/// `Database::claim_schema_dump` to make the decision race-safe.
///
/// `separate_non_transactional` excludes non-transactional tables from the
/// ordinary per-table data job: in less-locking mode those are bin-packed
/// into `Job::DumpNonTransactionalBucket`s by `non_transactional_tables`
/// instead, so they aren't double-scheduled here. `no_schemas` suppresses
/// the per-table `DumpTableSchema` job the same way it already suppresses
/// the per-database one.
pub fn jobs_for_plan(plan: &Plan, separate_non_transactional: bool, no_schemas: bool) -> Vec<Job> {
    let mut jobs = Vec::new();
    for db in plan.databases.values() {
        if db.claim_schema_dump() {
            jobs.push(Job::DumpSchema(db.name.clone()));
        }
    }
    for (chunk, table) in plan.tables.iter().enumerate() {
        match table.engine {
            EngineClass::View => jobs.push(Job::DumpView {
                database: table.database.clone(),
                view: table.name.clone(),
            }),
            EngineClass::NonTransactional if separate_non_transactional => {
                // Scheduled separately as a bin-packed less-locking bucket.
            }
            _ => {
                if !no_schemas {
                    jobs.push(Job::DumpTableSchema {
                        database: table.database.clone(),
                        table: table.name.clone(),
                    });
                }
                jobs.push(Job::DumpTableData {
                    database: table.database.clone(),
                    table: table.name.clone(),
                    chunk: chunk as u32,
                    is_non_transactional: table.engine == EngineClass::NonTransactional,
                });
            }
        }
    }
    jobs
}

/// The `(database, table, approx_data_length)` triples for every
/// non-transactional table in the plan, for bin-packing into less-locking
/// buckets via [`crate::worker::bin_pack_by_length`].
pub fn non_transactional_tables(plan: &Plan) -> Vec<(String, String, u64)> {
    plan.tables
        .iter()
        .filter(|t| t.engine == EngineClass::NonTransactional)
        .map(|t| (t.database.clone(), t.name.clone(), t.approx_data_length))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_dump_is_claimed_at_most_once() {
        let db = Database::new("analytics");
        assert!(db.claim_schema_dump());
        assert!(!db.claim_schema_dump());
        assert!(!db.claim_schema_dump());
    }

    #[test]
    fn jobs_for_plan_emits_one_schema_job_per_database() {
        let mut plan = Plan::default();
        plan.databases.insert("a".into(), Database::new("a"));
        plan.tables.push(Table {
            database: "a".into(),
            name: "t1".into(),
            engine: EngineClass::Transactional,
            approx_data_length: 10,
        });
        plan.tables.push(Table {
            database: "a".into(),
            name: "t2".into(),
            engine: EngineClass::Transactional,
            approx_data_length: 10,
        });
        let jobs = jobs_for_plan(&plan, false, false);
        let schema_jobs = jobs.iter().filter(|j| matches!(j, Job::DumpSchema(_))).count();
        let table_schema_jobs = jobs.iter().filter(|j| matches!(j, Job::DumpTableSchema { .. })).count();
        let data_jobs = jobs.iter().filter(|j| matches!(j, Job::DumpTableData { .. })).count();
        assert_eq!(schema_jobs, 1);
        assert_eq!(table_schema_jobs, 2);
        assert_eq!(data_jobs, 2);
        assert_eq!(jobs.len(), 5);
    }

    #[test]
    fn jobs_for_plan_separates_non_transactional_tables_when_requested() {
        let mut plan = Plan::default();
        plan.tables.push(Table {
            database: "a".into(),
            name: "myisam_t".into(),
            engine: EngineClass::NonTransactional,
            approx_data_length: 10,
        });
        plan.tables.push(Table {
            database: "a".into(),
            name: "innodb_t".into(),
            engine: EngineClass::Transactional,
            approx_data_length: 10,
        });

        let jobs = jobs_for_plan(&plan, true, true);
        assert_eq!(jobs.len(), 1);
        assert!(matches!(
            &jobs[0],
            Job::DumpTableData { table, is_non_transactional: false, .. } if table == "innodb_t"
        ));

        let non_transactional = non_transactional_tables(&plan);
        assert_eq!(non_transactional, vec![("a".to_string(), "myisam_t".to_string(), 10)]);
    }
}

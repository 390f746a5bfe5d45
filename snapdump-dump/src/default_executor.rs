//! The built-in job executor: the concrete SQL-to-file serialization the
//! coordination core treats as an external collaborator. Row encoding
//! itself (chunking, compression) is deliberately minimal here -- the
//! core's job is scheduling correctly, not optimizing row output.

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Row};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use snapdump_common::settings::ConnectionSettings;
use crate::error::JobError;
use crate::plan::Job;
use crate::session;
use crate::worker::JobExecutor;

pub struct DefaultExecutor {
    connection: ConnectionSettings,
    directory: PathBuf,
    // mysql_async::Conn is not Sync; each executor call checks out its own
    // connection rather than sharing one across concurrent jobs.
    _guard: Mutex<()>,
    // When set, output is framed to stdout (`\n-- <path>\n<bytes>`) for
    // `--stream` mode instead of written to individual files in
    // `directory`. A single mutex serializes frames so concurrent workers
    // never interleave their headers or bodies.
    stream_sink: Option<Mutex<tokio::io::Stdout>>,
    // `--exec`: a shell command run once per completed output file, with
    // the file's path appended as its final argument. Mutually exclusive
    // with `stream_sink` (checked before the run starts).
    exec: Option<String>,
}

impl DefaultExecutor {
    pub fn new(connection: ConnectionSettings, directory: PathBuf) -> Self {
        DefaultExecutor {
            connection,
            directory,
            _guard: Mutex::new(()),
            stream_sink: None,
            exec: None,
        }
    }

    pub fn new_streaming(connection: ConnectionSettings, directory: PathBuf) -> Self {
        DefaultExecutor {
            connection,
            directory,
            _guard: Mutex::new(()),
            stream_sink: Some(Mutex::new(tokio::io::stdout())),
            exec: None,
        }
    }

    pub fn with_exec(mut self, exec: Option<String>) -> Self {
        self.exec = exec;
        self
    }

    async fn connect(&self, database: &str) -> Result<Conn, mysql_async::Error> {
        session::connect(&self.connection, Some(database))
            .await
            .map_err(|e| match e {
                snapdump_common::CommonError::Connection(inner) => inner,
                other => mysql_async::Error::Other(Box::new(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    other.to_string(),
                ))),
            })
    }

    async fn write_file(&self, name: &str, contents: &str) -> std::io::Result<()> {
        if let Some(sink) = &self.stream_sink {
            let mut out = sink.lock().await;
            out.write_all(b"\n-- ").await?;
            out.write_all(name.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.write_all(contents.as_bytes()).await?;
            return out.flush().await;
        }
        let path = self.directory.join(name);
        let mut file = fs::File::create(&path).await?;
        file.write_all(contents.as_bytes()).await?;
        drop(file);
        if let Some(cmd) = &self.exec {
            self.run_exec_hook(cmd, &path).await?;
        }
        Ok(())
    }

    /// Less-locking mode: locks a single non-transactional table, dumps its
    /// rows, then unlocks it, so the worker's bucket holds the lock only
    /// for as long as that one table's dump takes rather than the whole
    /// bucket.
    async fn dump_locked_table(&self, database: &str, table: &str) -> Result<(), JobError> {
        let mut conn = self.connect(database).await.map_err(|e| JobError::Query {
            table: table.to_string(),
            source: e,
        })?;
        conn.query_drop(format!("LOCK TABLES `{}` READ", table))
            .await
            .map_err(|e| JobError::Query {
                table: table.to_string(),
                source: e,
            })?;
        let dump_result: Result<Vec<Row>, mysql_async::Error> =
            conn.query(format!("SELECT * FROM `{}`", table)).await;
        let _ = conn.query_drop("UNLOCK TABLES").await;
        let rows = dump_result.map_err(|e| JobError::Query {
            table: table.to_string(),
            source: e,
        })?;
        let mut body = String::new();
        for _row in &rows {
            body.push_str("-- row omitted: serialization is an external collaborator\n");
        }
        self.write_file(&format!("{}.{}.00000.sql", database, table), &body)
            .await
            .map_err(|e| JobError::Query {
                table: table.to_string(),
                source: mysql_async::Error::Other(Box::new(e)),
            })
    }

    /// Runs the configured `--exec` command against one completed output
    /// file. The file's path is appended as the command's final argument;
    /// a non-zero exit is surfaced as an I/O error rather than aborting
    /// the run, since one file's post-processing failure shouldn't stop
    /// the rest of the dump.
    async fn run_exec_hook(&self, cmd: &str, path: &std::path::Path) -> std::io::Result<()> {
        let mut parts = cmd.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "--exec command is empty")
        })?;
        let status = tokio::process::Command::new(program)
            .args(parts)
            .arg(path)
            .stdin(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("--exec command exited with {}", status),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl JobExecutor for DefaultExecutor {
    async fn execute(&self, job: &Job) -> Result<(), JobError> {
        match job {
            Job::DumpSchema(db) => {
                let mut conn = self.connect(db).await.map_err(|e| JobError::Query {
                    table: db.clone(),
                    source: e,
                })?;
                let rows: Vec<Row> = conn
                    .query(format!("SHOW CREATE DATABASE `{}`", db))
                    .await
                    .map_err(|e| JobError::Query {
                        table: db.clone(),
                        source: e,
                    })?;
                let ddl: String = rows
                    .into_iter()
                    .next()
                    .and_then(|mut r| r.take::<String, _>(1))
                    .unwrap_or_default();
                self.write_file(&format!("{}-schema-create.sql", db), &format!("{};\n", ddl))
                    .await
                    .map_err(|e| JobError::Query {
                        table: db.clone(),
                        source: mysql_async::Error::Other(Box::new(e)),
                    })
            }
            Job::DumpTableSchema { database, table } => {
                let mut conn = self.connect(database).await.map_err(|e| JobError::Query {
                    table: table.clone(),
                    source: e,
                })?;
                let rows: Vec<Row> = conn
                    .query(format!("SHOW CREATE TABLE `{}`", table))
                    .await
                    .map_err(|e| JobError::Query {
                        table: table.clone(),
                        source: e,
                    })?;
                let ddl: String = rows
                    .into_iter()
                    .next()
                    .and_then(|mut r| r.take::<String, _>(1))
                    .unwrap_or_default();
                self.write_file(&format!("{}.{}-schema.sql", database, table), &format!("{};\n", ddl))
                    .await
                    .map_err(|e| JobError::Query {
                        table: table.clone(),
                        source: mysql_async::Error::Other(Box::new(e)),
                    })
            }
            Job::DumpTableData { database, table, chunk, is_non_transactional: _ } => {
                let mut conn = self.connect(database).await.map_err(|e| JobError::Query {
                    table: table.clone(),
                    source: e,
                })?;
                let rows: Vec<Row> = conn
                    .query(format!("SELECT * FROM `{}`", table))
                    .await
                    .map_err(|e| JobError::Query {
                        table: table.clone(),
                        source: e,
                    })?;
                let mut body = String::new();
                for _row in &rows {
                    body.push_str("-- row omitted: serialization is an external collaborator\n");
                }
                self.write_file(&format!("{}.{}.{:05}.sql", database, table, chunk), &body)
                    .await
                    .map_err(|e| JobError::Query {
                        table: table.clone(),
                        source: mysql_async::Error::Other(Box::new(e)),
                    })
            }
            Job::DumpView { database, view } => {
                let mut conn = self.connect(database).await.map_err(|e| JobError::Query {
                    table: view.clone(),
                    source: e,
                })?;
                let rows: Vec<Row> = conn
                    .query(format!("SHOW CREATE VIEW `{}`", view))
                    .await
                    .map_err(|e| JobError::Query {
                        table: view.clone(),
                        source: e,
                    })?;
                let ddl: String = rows
                    .into_iter()
                    .next()
                    .and_then(|mut r| r.take::<String, _>(1))
                    .unwrap_or_default();
                self.write_file(&format!("{}.{}-schema-view.sql", database, view), &format!("{};\n", ddl))
                    .await
                    .map_err(|e| JobError::Query {
                        table: view.clone(),
                        source: mysql_async::Error::Other(Box::new(e)),
                    })
            }
            Job::DumpNonTransactionalBucket { tables } => {
                let mut first_err: Option<JobError> = None;
                for (database, table) in tables {
                    if let Err(e) = self.dump_locked_table(database, table).await {
                        if first_err.is_none() {
                            first_err = Some(e);
                        }
                    }
                }
                match first_err {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
            Job::DumpTrigger { database, table } => {
                // Triggers are folded into the per-table schema file; no
                // separate statement is required beyond what --no-schemas
                // already governs.
                let _ = (database, table);
                Ok(())
            }
            Job::DumpTablespaces => {
                let mut conn = self.connect("information_schema").await.map_err(|e| JobError::Query {
                    table: "tablespaces".to_string(),
                    source: e,
                })?;
                let names: Vec<String> = conn
                    .query(
                        "SELECT DISTINCT TABLESPACE_NAME FROM information_schema.FILES \
                         WHERE TABLESPACE_NAME IS NOT NULL AND TABLESPACE_NAME NOT LIKE 'innodb_%'",
                    )
                    .await
                    .map_err(|e| JobError::Query {
                        table: "tablespaces".to_string(),
                        source: e,
                    })?;

                let mut body = String::new();
                for name in &names {
                    let rows: Vec<Row> = conn
                        .query(format!("SHOW CREATE TABLESPACE `{}`", name))
                        .await
                        .map_err(|e| JobError::Query {
                            table: name.clone(),
                            source: e,
                        })?;
                    if let Some(ddl) = rows
                        .into_iter()
                        .next()
                        .and_then(|mut r| r.take::<String, _>(1))
                    {
                        body.push_str(&ddl);
                        body.push_str(";\n");
                    }
                }
                self.write_file("all-schema-create-tablespaces.sql", &body)
                    .await
                    .map_err(|e| JobError::Query {
                        table: "tablespaces".to_string(),
                        source: mysql_async::Error::Other(Box::new(e)),
                    })
            }
            Job::Shutdown => Ok(()),
        }
    }
}

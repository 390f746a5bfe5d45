//! Applies a classified restore job against the target server. Like the
//! dump side's `DefaultExecutor`, this is the external collaborator the
//! core scheduling logic treats as a narrow interface -- reading the file
//! and issuing it to the server, nothing more.

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::Conn;
use std::path::PathBuf;
use tokio::fs;

use snapdump_common::settings::ConnectionSettings;

use crate::error::RestoreJobError;
use crate::scheduler::RestoreJob;
use crate::session::connect;

#[async_trait]
pub trait RestoreExecutor: Send + Sync {
    async fn apply(&self, job: &RestoreJob) -> Result<(), RestoreJobError>;
}

pub struct DefaultRestoreExecutor {
    connection: ConnectionSettings,
    directory: PathBuf,
    target_db: Option<String>,
}

impl DefaultRestoreExecutor {
    pub fn new(connection: ConnectionSettings, directory: PathBuf, target_db: Option<String>) -> Self {
        DefaultRestoreExecutor {
            connection,
            directory,
            target_db,
        }
    }

    async fn connect(&self, database: Option<&str>) -> Result<Conn, mysql_async::Error> {
        let db = database.or(self.target_db.as_deref());
        connect(&self.connection, db).await.map_err(|e| match e {
            snapdump_common::CommonError::Connection(inner) => inner,
            other => mysql_async::Error::Other(Box::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                other.to_string(),
            ))),
        })
    }

    async fn apply_file(&self, file: &str, database: Option<&str>) -> Result<(), mysql_async::Error> {
        let path = self.directory.join(file);
        let sql = fs::read_to_string(&path)
            .await
            .map_err(|e| mysql_async::Error::Other(Box::new(e)))?;
        let mut conn = self.connect(database).await?;
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            conn.query_drop(statement).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RestoreExecutor for DefaultRestoreExecutor {
    async fn apply(&self, job: &RestoreJob) -> Result<(), RestoreJobError> {
        match job {
            RestoreJob::CreateDatabase { file } => self
                .apply_file(file, None)
                .await
                .map_err(|e| RestoreJobError::Apply {
                    file: file.clone(),
                    source: e,
                }),
            RestoreJob::TableStructure { file, database, .. }
            | RestoreJob::Data { file, database, .. } => self
                .apply_file(file, Some(database))
                .await
                .map_err(|e| RestoreJobError::Apply {
                    file: file.clone(),
                    source: e,
                }),
            RestoreJob::Post { file } => self
                .apply_file(file, self.target_db.as_deref())
                .await
                .map_err(|e| RestoreJobError::Apply {
                    file: file.clone(),
                    source: e,
                }),
            RestoreJob::Shutdown => Ok(()),
        }
    }
}

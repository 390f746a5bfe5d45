//! Server dialect detection (C1): identifies the connected server family
//! and version, and from that picks the lock strategy the lock controller
//! (`crate::lock`) will use.

use mysql_async::prelude::Queryable;
use mysql_async::Conn;
use snapdump_common::CommonError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerKind {
    MySql,
    MariaDb,
    Percona,
    TiDb,
    Drizzle,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    fn parse(raw: &str) -> Version {
        let mut parts = raw.split(|c: char| !c.is_ascii_digit()).filter(|s| !s.is_empty());
        let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let patch = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        Version { major, minor, patch }
    }
}

#[derive(Clone, Debug)]
pub struct Dialect {
    pub kind: ServerKind,
    pub version: Version,
    pub version_comment: String,
    pub version_string: String,
    pub is_tokudb: bool,
}

/// Lock strategy the controller should drive for a given dialect. Mirrors
/// the acquire/release pairs in the lock strategy table: Percona 8 and
/// MySQL 8 both use a single instance-level backup lock, Percona 5.7 needs
/// a second connection to release its two lock flavors, MariaDB uses the
/// staged `BACKUP STAGE` protocol, and TiDB needs no explicit lock at all
/// because `tidb_snapshot` already pins a read view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockStrategy {
    InstanceBackupLock,
    Percona57TwoConnection,
    MariaDbBackupStage,
    TiDbSnapshotOnly,
    None,
}

impl Dialect {
    pub fn lock_strategy(&self) -> LockStrategy {
        match self.kind {
            ServerKind::TiDb => LockStrategy::TiDbSnapshotOnly,
            ServerKind::Percona if self.version.major == 5 && self.version.minor == 7 => {
                LockStrategy::Percona57TwoConnection
            }
            ServerKind::Percona | ServerKind::MySql if self.version.major >= 8 => {
                LockStrategy::InstanceBackupLock
            }
            ServerKind::MariaDb if self.version.major >= 10 && self.version.minor >= 5 => {
                LockStrategy::MariaDbBackupStage
            }
            _ => LockStrategy::None,
        }
    }

    /// Below MySQL 4.1.8, `START TRANSACTION WITH CONSISTENT SNAPSHOT`
    /// doesn't exist yet, so the snapshot has to be bound with a dummy
    /// read instead. Compares the whole version, not just the minor
    /// component, so 4.1.0-4.1.7 are caught along with anything pre-4.1.
    pub fn needs_dummy_snapshot_read(&self) -> bool {
        matches!(self.kind, ServerKind::MySql)
            && self.version
                < Version {
                    major: 4,
                    minor: 1,
                    patch: 8,
                }
    }
}

/// Probes `@@version_comment`, `@@version`, and `@@tokudb_version` to
/// classify the server. Fails fatally (`CommonError::UnknownDialect`) when
/// neither of the first two strings matches a recognized family -- dumping
/// against an unknown dialect risks picking the wrong lock strategy and
/// producing a non-consistent backup. `@@tokudb_version` is best-effort:
/// servers without the TokuDB plugin reject the query outright, which is
/// read as "not TokuDB" rather than propagated.
pub async fn probe(conn: &mut Conn) -> Result<Dialect, CommonError> {
    let version_comment: Option<String> = conn
        .query_first("SELECT @@version_comment")
        .await
        .map_err(|e| CommonError::SessionVariable {
            name: "version_comment",
            source: e,
        })?;
    let version_string: String = conn
        .query_first("SELECT @@version")
        .await
        .map_err(|e| CommonError::SessionVariable {
            name: "version",
            source: e,
        })?
        .unwrap_or_default();
    let is_tokudb = conn
        .query_first::<String, _>("SELECT @@tokudb_version")
        .await
        .ok()
        .flatten()
        .is_some();

    let comment_lower = version_comment.clone().unwrap_or_default().to_lowercase();
    let version_lower = version_string.to_lowercase();
    let version = Version::parse(&version_string);

    let kind = if version_lower.contains("tidb") {
        ServerKind::TiDb
    } else if comment_lower.contains("percona") {
        ServerKind::Percona
    } else if comment_lower.contains("mariadb") || version_lower.contains("mariadb") {
        ServerKind::MariaDb
    } else if comment_lower.contains("drizzle") {
        ServerKind::Drizzle
    } else if comment_lower.contains("mysql") || version_lower.contains("mysql") || !version_string.is_empty() {
        ServerKind::MySql
    } else {
        return Err(CommonError::UnknownDialect {
            version_comment,
            version: version_string,
        });
    };

    Ok(Dialect {
        kind,
        version,
        version_comment: version_comment.unwrap_or_default(),
        version_string,
        is_tokudb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parses_dotted_triplet() {
        assert_eq!(
            Version::parse("8.0.31"),
            Version {
                major: 8,
                minor: 0,
                patch: 31
            }
        );
    }

    #[test]
    fn percona_57_gets_two_connection_strategy() {
        let d = Dialect {
            kind: ServerKind::Percona,
            version: Version::parse("5.7.38"),
            version_comment: "Percona Server".into(),
            version_string: "5.7.38-41".into(),
            is_tokudb: false,
        };
        assert_eq!(d.lock_strategy(), LockStrategy::Percona57TwoConnection);
    }

    #[test]
    fn tidb_never_needs_explicit_locks() {
        let d = Dialect {
            kind: ServerKind::TiDb,
            version: Version::parse("6.5.0"),
            version_comment: String::new(),
            version_string: "5.7.25-TiDB-v6.5.0".into(),
            is_tokudb: false,
        };
        assert_eq!(d.lock_strategy(), LockStrategy::TiDbSnapshotOnly);
    }

    #[test]
    fn needs_dummy_snapshot_read_covers_whole_pre_4_1_8_range() {
        let mk = |v: &str| Dialect {
            kind: ServerKind::MySql,
            version: Version::parse(v),
            version_comment: String::new(),
            version_string: v.into(),
            is_tokudb: false,
        };
        assert!(mk("4.0.27").needs_dummy_snapshot_read());
        assert!(mk("4.1.0").needs_dummy_snapshot_read());
        assert!(mk("4.1.7").needs_dummy_snapshot_read());
        assert!(!mk("4.1.8").needs_dummy_snapshot_read());
        assert!(!mk("5.0.0").needs_dummy_snapshot_read());
    }
}

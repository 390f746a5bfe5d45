//! Decides whether a given `(database, table)` pair is in scope for a dump
//! or restore run: an optional table allowlist, an optional skiplist, and
//! an optional regex, composed in that order with short-circuiting.

use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid regex pattern {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Composition of the three scope checks described for the dump/restore
/// filter. Constructed once per run and shared (read-only) across workers.
#[derive(Debug, Default)]
pub struct Filter {
    allowlist: Option<HashSet<String>>,
    skiplist: Option<HashSet<String>>,
    regex: Option<Regex>,
}

impl Filter {
    pub fn builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    /// `table` is `None` when only a database name is being tested (the
    /// regex is consulted against the bare database name in that case;
    /// the allowlist and skiplist, which key on `db.table`, are skipped).
    pub fn accept(&self, database: &str, table: Option<&str>) -> bool {
        match table {
            Some(table) => {
                let qualified = format!("{}.{}", database, table);
                if let Some(allow) = &self.allowlist {
                    if !allow.contains(&table.to_lowercase()) {
                        return false;
                    }
                }
                if let Some(skip) = &self.skiplist {
                    if skip.contains(&qualified) {
                        return false;
                    }
                }
                self.regex
                    .as_ref()
                    .map(|re| re.is_match(&qualified))
                    .unwrap_or(true)
            }
            None => self
                .regex
                .as_ref()
                .map(|re| re.is_match(database))
                .unwrap_or(true),
        }
    }
}

#[derive(Debug, Default)]
pub struct FilterBuilder {
    allowlist: Option<HashSet<String>>,
    skiplist: Option<HashSet<String>>,
    pattern: Option<String>,
}

impl FilterBuilder {
    pub fn allowlist<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = Some(tables.into_iter().map(|s| s.into().to_lowercase()).collect());
        self
    }

    pub fn skiplist<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skiplist = Some(entries.into_iter().map(Into::into).collect());
        self
    }

    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn build(self) -> Result<Filter, FilterError> {
        let regex = match self.pattern {
            Some(pattern) => Some(Regex::new(&pattern).map_err(|source| FilterError::InvalidRegex {
                pattern: pattern.clone(),
                source,
            })?),
            None => None,
        };
        Ok(Filter {
            allowlist: self.allowlist,
            skiplist: self.skiplist,
            regex,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_accepts_everything() {
        let f = Filter::builder().build().unwrap();
        assert!(f.accept("db", Some("t")));
        assert!(f.accept("db", None));
    }

    #[test]
    fn allowlist_is_case_insensitive_and_table_only() {
        let f = Filter::builder().allowlist(vec!["Users"]).build().unwrap();
        assert!(f.accept("db", Some("users")));
        assert!(f.accept("other_db", Some("USERS")));
        assert!(!f.accept("db", Some("orders")));
    }

    #[test]
    fn skiplist_blocks_qualified_name() {
        let f = Filter::builder()
            .skiplist(vec!["db.secrets"])
            .build()
            .unwrap();
        assert!(!f.accept("db", Some("secrets")));
        assert!(f.accept("db", Some("orders")));
    }

    #[test]
    fn regex_is_matched_against_qualified_name() {
        let f = Filter::builder().regex(r"^db\.t_.*$").build().unwrap();
        assert!(f.accept("db", Some("t_users")));
        assert!(!f.accept("db", Some("orders")));
    }

    #[test]
    fn checks_short_circuit_in_any_order_to_the_same_result() {
        let f = Filter::builder()
            .allowlist(vec!["orders"])
            .skiplist(vec!["db.orders"])
            .build()
            .unwrap();
        // allowlist passes, skiplist then rejects -- composition is AND, so
        // order of evaluation must not change the outcome.
        assert!(!f.accept("db", Some("orders")));
    }

    #[test]
    fn invalid_pattern_is_rejected_at_build_time() {
        let err = Filter::builder().regex("(").build();
        assert!(err.is_err());
    }
}

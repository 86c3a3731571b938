use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::OptionalExtension;
use serde::Serialize;
use tracing::debug;

use crate::cache::TtlCache;
use crate::store::{open_readonly, text_column};

/// Where a wiki's content lives and where its pages are served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionProfile {
    pub storage_host: String,
    pub web_domain: String,
}

/// One `wiki` row, decoded by column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiRecord {
    pub dbname: String,
    pub url: String,
}

/// Read access to the replica metadata (`meta_p`) database.
pub trait MetaStore: Send + Sync {
    /// Open wiki identifiers, ascending.
    fn open_databases(&self) -> Result<Vec<String>>;
    /// The open wiki with this identifier, if any.
    fn find_open_wiki(&self, dbname: &str) -> Result<Option<WikiRecord>>;
}

pub struct SqliteMetaStore {
    db_path: PathBuf,
}

impl SqliteMetaStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

impl MetaStore for SqliteMetaStore {
    fn open_databases(&self) -> Result<Vec<String>> {
        let connection = open_readonly(&self.db_path)?;
        let mut statement = connection
            .prepare(
                "SELECT dbname
                 FROM wiki
                 WHERE is_closed = 0
                 ORDER BY dbname ASC",
            )
            .context("failed to prepare database list query")?;
        let rows = statement
            .query_map([], |row| text_column(row, 0))
            .context("failed to run database list query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to decode database list row")?);
        }
        Ok(out)
    }

    fn find_open_wiki(&self, dbname: &str) -> Result<Option<WikiRecord>> {
        let connection = open_readonly(&self.db_path)?;
        connection
            .query_row(
                "SELECT dbname, url
                 FROM wiki
                 WHERE dbname = ?1
                   AND is_closed = 0
                 LIMIT 1",
                [dbname],
                |row| {
                    Ok(WikiRecord {
                        dbname: text_column(row, 0)?,
                        url: text_column(row, 1)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("failed to look up wiki {dbname}"))
    }
}

/// Resolves wiki identifiers to connection profiles, memoizing the answer.
pub struct HostResolver {
    store: Box<dyn MetaStore>,
    host_suffix: String,
    profiles: TtlCache<String, Option<ConnectionProfile>>,
    databases: TtlCache<(), Vec<String>>,
}

impl HostResolver {
    pub fn new(
        store: Box<dyn MetaStore>,
        host_suffix: impl Into<String>,
        profiles: TtlCache<String, Option<ConnectionProfile>>,
        databases: TtlCache<(), Vec<String>>,
    ) -> Self {
        Self {
            store,
            host_suffix: host_suffix.into(),
            profiles,
            databases,
        }
    }

    /// `Ok(None)` means the wiki is unknown or closed.
    pub fn resolve(&self, dbname: &str) -> Result<Option<ConnectionProfile>> {
        self.profiles
            .get_or_try_insert_with(&dbname.to_string(), || {
                let record = self.store.find_open_wiki(dbname)?;
                let profile = record
                    .filter(|record| !record.url.trim().is_empty())
                    .map(|record| ConnectionProfile {
                        storage_host: storage_host(&record.dbname, &self.host_suffix),
                        web_domain: record.url,
                    });
                debug!(dbname, found = profile.is_some(), "resolved wiki host");
                Ok(profile)
            })
    }

    pub fn database_list(&self) -> Result<Vec<String>> {
        self.databases
            .get_or_try_insert_with(&(), || self.store.open_databases())
    }
}

pub fn storage_host(dbname: &str, suffix: &str) -> String {
    format!("{dbname}.{suffix}")
}

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::config::CheckerConfig;
use crate::hosts::{ConnectionProfile, HostResolver, SqliteMetaStore};
use crate::links::{Classification, ClassifyRequest, ContentSource, SqliteContentSource, classify_index};
use crate::namespaces::{MediaWikiSiteInfo, NamespaceDiscoverer};
use crate::runtime::ResolvedPaths;
use crate::selector::select_database;
use crate::title::{clean_input_title, strip_index_namespace, to_display};

/// Query string of the tool's single page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckerQuery {
    pub db: Option<String>,
    pub title: Option<String>,
}

/// What the user is told when a request cannot be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserError {
    UnknownDatabase,
    General,
}

impl UserError {
    pub fn message(self) -> &'static str {
        match self {
            Self::UnknownDatabase => "You didn't specify an appropriate database name.",
            Self::General => "There was some sort of error. Sorry. :-(",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionForm {
    pub databases: Vec<String>,
    pub selected_db: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub db: String,
    pub domain: String,
    pub index_title: String,
    pub page_namespace: String,
    #[serde(flatten)]
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckerPage {
    Form(SelectionForm),
    Report(CheckReport),
    Error(UserError),
}

pub struct Checker {
    default_db: String,
    hosts: HostResolver,
    namespaces: NamespaceDiscoverer,
    content: Box<dyn ContentSource>,
}

impl Checker {
    pub fn new(
        default_db: impl Into<String>,
        hosts: HostResolver,
        namespaces: NamespaceDiscoverer,
        content: Box<dyn ContentSource>,
    ) -> Self {
        Self {
            default_db: default_db.into(),
            hosts,
            namespaces,
            content,
        }
    }

    /// Wire the SQLite replicas and the live MediaWiki API together.
    pub fn from_config(config: &CheckerConfig, paths: &ResolvedPaths) -> Self {
        let ttl = config.cache_ttl();
        let hosts = HostResolver::new(
            Box::new(SqliteMetaStore::new(&paths.meta_db_path)),
            config.host_suffix(),
            TtlCache::new(ttl),
            TtlCache::new(ttl),
        );
        let namespaces = NamespaceDiscoverer::new(
            Box::new(MediaWikiSiteInfo::new(config.user_agent(), config.timeout())),
            TtlCache::new(ttl),
        );
        let content = Box::new(SqliteContentSource::new(
            &paths.replica_dir,
            config.link_schema(),
        ));
        Self::new(config.default_db(), hosts, namespaces, content)
    }

    pub fn database_list(&self) -> Result<Vec<String>> {
        self.hosts.database_list()
    }

    /// Answer one request. Lookup failures are logged and reported to the
    /// user as a [`UserError`].
    pub fn handle(&self, query: &CheckerQuery) -> CheckerPage {
        let db = select_database(query.db.as_deref(), &self.default_db);
        let title = query
            .title
            .as_deref()
            .map(clean_input_title)
            .unwrap_or_default();

        let profile = match self.hosts.resolve(&db) {
            Ok(profile) => profile,
            Err(error) => {
                warn!(db = %db, error = %format!("{error:#}"), "host lookup failed");
                return CheckerPage::Error(UserError::General);
            }
        };

        if title.is_empty() {
            if profile.is_none() {
                return CheckerPage::Error(UserError::UnknownDatabase);
            }
            return match self.hosts.database_list() {
                Ok(databases) => CheckerPage::Form(SelectionForm {
                    databases,
                    selected_db: db,
                }),
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "database list lookup failed");
                    CheckerPage::Error(UserError::General)
                }
            };
        }

        let Some(profile) = profile else {
            debug!(db = %db, "title given for unknown database");
            return CheckerPage::Error(UserError::General);
        };
        match self.check(&db, &profile, &title) {
            Ok(Some(report)) => CheckerPage::Report(report),
            Ok(None) => CheckerPage::Error(UserError::General),
            Err(error) => {
                warn!(db = %db, title = %title, error = %format!("{error:#}"), "check failed");
                CheckerPage::Error(UserError::General)
            }
        }
    }

    fn check(
        &self,
        db: &str,
        profile: &ConnectionProfile,
        title: &str,
    ) -> Result<Option<CheckReport>> {
        let Some(namespaces) = self.namespaces.discover(&profile.web_domain)? else {
            debug!(db, domain = %profile.web_domain, "wiki lacks ProofreadPage");
            return Ok(None);
        };
        let Some(index_title) = strip_index_namespace(title, &namespaces.index_namespace_name)
        else {
            debug!(db, title, "title is not an index page");
            return Ok(None);
        };

        let store = self.content.open(db, profile)?;
        let classification = classify_index(
            store.as_ref(),
            &ClassifyRequest {
                domain: &profile.web_domain,
                page_namespace_id: namespaces.page_namespace_id,
                index_namespace_id: namespaces.index_namespace_id,
                page_namespace_name: &namespaces.page_namespace_name,
                index_title: &index_title,
            },
        )?;

        Ok(Some(CheckReport {
            db: db.to_string(),
            domain: profile.web_domain.clone(),
            index_title: format!(
                "{}:{}",
                namespaces.index_namespace_name,
                to_display(&index_title)
            ),
            page_namespace: namespaces.page_namespace_name,
            classification,
        }))
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hosts::ConnectionProfile;
use crate::selector::STORAGE_SUFFIX;
use crate::store::{open_readonly, text_column};
use crate::title::{encode_for_url, to_display};

const NS_MAIN: i64 = 0;

/// Which link tables the replica carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSchema {
    /// `templatelinks` keyed through `linktarget` (MediaWiki 1.39+).
    #[default]
    LinkTarget,
    /// `pagelinks` for the index and `tl_namespace`/`tl_title` templatelinks.
    PageLinks,
}

impl LinkSchema {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinkTarget => "linktarget",
            Self::PageLinks => "pagelinks",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub title: String,
    pub sort_key: i64,
}

impl PageLink {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        let sort_key = sort_key(&title);
        Self { title, sort_key }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStatus {
    pub transclusion_count: u64,
    pub proofread_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub domain: String,
    pub namespace_name: String,
    pub title: String,
    pub status: Option<String>,
}

impl ResultRow {
    /// Live page URL, `<domain>/wiki/<Namespace>:<title>`.
    pub fn href(&self) -> String {
        format!(
            "{}/wiki/{}",
            self.domain.trim_end_matches('/'),
            encode_for_url(&format!("{}:{}", self.namespace_name, self.title))
        )
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.namespace_name, to_display(&self.title))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub transcluded: Vec<ResultRow>,
    pub not_transcluded: Vec<ResultRow>,
}

#[derive(Debug, Clone)]
pub struct ClassifyRequest<'a> {
    pub domain: &'a str,
    pub page_namespace_id: i64,
    pub index_namespace_id: i64,
    pub page_namespace_name: &'a str,
    /// Index page title in database form, without its namespace.
    pub index_title: &'a str,
}

/// Read access to one wiki's content replica.
pub trait ContentStore {
    /// Existing pages in `page_namespace` linked from the index page, in
    /// retrieval order.
    fn page_links(
        &self,
        page_namespace: i64,
        index_namespace: i64,
        index_title: &str,
    ) -> Result<Vec<String>>;
    /// Transclusions of the page into the main namespace.
    fn transclusion_count(&self, page_namespace: i64, title: &str) -> Result<u64>;
    /// Raw category names on the page, ascending.
    fn categories(&self, page_namespace: i64, title: &str) -> Result<Vec<String>>;
}

/// Opens a content store for a resolved wiki.
pub trait ContentSource: Send + Sync {
    fn open(&self, dbname: &str, profile: &ConnectionProfile) -> Result<Box<dyn ContentStore>>;
}

/// Replica files laid out as `<replica_dir>/<storage_host>/<dbname>_p.db`.
pub struct SqliteContentSource {
    replica_dir: PathBuf,
    schema: LinkSchema,
}

impl SqliteContentSource {
    pub fn new(replica_dir: impl Into<PathBuf>, schema: LinkSchema) -> Self {
        Self {
            replica_dir: replica_dir.into(),
            schema,
        }
    }

    pub fn replica_path(&self, dbname: &str, profile: &ConnectionProfile) -> PathBuf {
        self.replica_dir
            .join(&profile.storage_host)
            .join(format!("{dbname}{STORAGE_SUFFIX}.db"))
    }
}

impl ContentSource for SqliteContentSource {
    fn open(&self, dbname: &str, profile: &ConnectionProfile) -> Result<Box<dyn ContentStore>> {
        let path = self.replica_path(dbname, profile);
        let connection = open_readonly(&path)?;
        Ok(Box::new(SqliteContentStore {
            connection,
            schema: self.schema,
        }))
    }
}

pub struct SqliteContentStore {
    connection: Connection,
    schema: LinkSchema,
}

impl SqliteContentStore {
    pub fn new(connection: Connection, schema: LinkSchema) -> Self {
        Self { connection, schema }
    }
}

impl ContentStore for SqliteContentStore {
    fn page_links(
        &self,
        page_namespace: i64,
        index_namespace: i64,
        index_title: &str,
    ) -> Result<Vec<String>> {
        let sql = match self.schema {
            LinkSchema::LinkTarget => {
                "SELECT lt_title
                 FROM templatelinks
                 JOIN linktarget ON tl_target_id = lt_id
                 JOIN page AS source ON tl_from = source.page_id
                 JOIN page AS target
                   ON target.page_title = lt_title
                  AND target.page_namespace = lt_namespace
                 WHERE lt_namespace = ?1
                   AND source.page_namespace = ?2
                   AND source.page_title = ?3
                 ORDER BY lt_title ASC"
            }
            LinkSchema::PageLinks => {
                "SELECT pl_title
                 FROM pagelinks
                 JOIN page AS source ON pl_from = source.page_id
                 JOIN page AS target
                   ON target.page_title = pl_title
                  AND target.page_namespace = pl_namespace
                 WHERE pl_namespace = ?1
                   AND source.page_namespace = ?2
                   AND source.page_title = ?3
                 ORDER BY pl_title ASC"
            }
        };
        let mut statement = self
            .connection
            .prepare(sql)
            .context("failed to prepare page links query")?;
        let rows = statement
            .query_map(params![page_namespace, index_namespace, index_title], |row| {
                text_column(row, 0)
            })
            .context("failed to run page links query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to decode page links row")?);
        }
        Ok(out)
    }

    fn transclusion_count(&self, page_namespace: i64, title: &str) -> Result<u64> {
        let sql = match self.schema {
            LinkSchema::LinkTarget => {
                "SELECT COUNT(*)
                 FROM templatelinks
                 JOIN linktarget ON tl_target_id = lt_id
                 JOIN page ON tl_from = page_id
                 WHERE lt_namespace = ?1
                   AND lt_title = ?2
                   AND page_namespace = ?3"
            }
            LinkSchema::PageLinks => {
                "SELECT COUNT(*)
                 FROM templatelinks
                 JOIN page ON tl_from = page_id
                 WHERE tl_namespace = ?1
                   AND tl_title = ?2
                   AND page_namespace = ?3"
            }
        };
        let count: i64 = self
            .connection
            .query_row(sql, params![page_namespace, title, NS_MAIN], |row| {
                row.get(0)
            })
            .with_context(|| format!("failed to count transclusions of {title}"))?;
        u64::try_from(count).context("transclusion count is negative")
    }

    fn categories(&self, page_namespace: i64, title: &str) -> Result<Vec<String>> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT cl_to
                 FROM page
                 JOIN categorylinks ON cl_from = page_id
                 WHERE page_namespace = ?1
                   AND page_title = ?2
                 ORDER BY cl_to ASC",
            )
            .context("failed to prepare category query")?;
        let rows = statement
            .query_map(params![page_namespace, title], |row| text_column(row, 0))
            .context("failed to run category query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to decode category row")?);
        }
        Ok(out)
    }
}

/// Integer after the last `/`, or 1 when there is none.
pub fn sort_key(title: &str) -> i64 {
    title
        .rsplit_once('/')
        .and_then(|(_, suffix)| suffix.parse::<i64>().ok())
        .unwrap_or(1)
}

/// Stable: links with equal keys keep their retrieval order.
pub fn sort_page_links(links: &mut [PageLink]) {
    links.sort_by_key(|link| link.sort_key);
}

pub fn normalize_status(category: &str) -> String {
    category.to_lowercase().replace('_', " ")
}

pub fn page_status(store: &dyn ContentStore, page_namespace: i64, title: &str) -> Result<PageStatus> {
    let transclusion_count = store.transclusion_count(page_namespace, title)?;
    let categories = store.categories(page_namespace, title)?;
    if categories.len() > 1 {
        debug!(title, ?categories, "page carries several categories; using the first");
    }
    Ok(PageStatus {
        transclusion_count,
        proofread_status: categories.first().map(|category| normalize_status(category)),
    })
}

/// Split the pages linked from an index page by whether they are
/// transcluded into the main namespace.
pub fn classify_index(
    store: &dyn ContentStore,
    request: &ClassifyRequest<'_>,
) -> Result<Classification> {
    let mut links = store
        .page_links(
            request.page_namespace_id,
            request.index_namespace_id,
            request.index_title,
        )?
        .into_iter()
        .map(PageLink::new)
        .collect::<Vec<_>>();
    sort_page_links(&mut links);
    debug!(
        index = request.index_title,
        links = links.len(),
        "loaded index page links"
    );

    let mut classification = Classification::default();
    for link in links {
        let status = page_status(store, request.page_namespace_id, &link.title)?;
        let row = ResultRow {
            domain: request.domain.to_string(),
            namespace_name: request.page_namespace_name.to_string(),
            title: link.title,
            status: status.proofread_status,
        };
        if status.transclusion_count > 0 {
            classification.transcluded.push(row);
        } else {
            classification.not_transcluded.push(row);
        }
    }
    Ok(classification)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use anyhow::Result;
    use rusqlite::{Connection, params};
    use tempfile::tempdir;

    use super::{
        ClassifyRequest, ContentSource, ContentStore, LinkSchema, PageLink, ResultRow,
        SqliteContentSource, SqliteContentStore, classify_index, normalize_status, page_status,
        sort_key, sort_page_links,
    };
    use crate::hosts::ConnectionProfile;

    pub(crate) const PAGE_NS: i64 = 104;
    pub(crate) const INDEX_NS: i64 = 106;

    /// Minimal replica: one index page, its Page: links, and transclusions.
    pub(crate) struct ReplicaFixture {
        pub(crate) pages: Vec<(i64, i64, &'static str)>,
        /// (from page id, target namespace, target title)
        pub(crate) links: Vec<(i64, i64, &'static str)>,
        /// (from page id, target namespace, target title)
        pub(crate) transclusions: Vec<(i64, i64, &'static str)>,
        /// (page id, category)
        pub(crate) categories: Vec<(i64, &'static str)>,
    }

    impl ReplicaFixture {
        pub(crate) fn example() -> Self {
            Self {
                pages: vec![
                    (1, INDEX_NS, "Example/1"),
                    (2, PAGE_NS, "Example/1/2"),
                    (3, PAGE_NS, "Example/1/1"),
                    (4, 0, "Example_chapter"),
                ],
                links: vec![
                    (1, PAGE_NS, "Example/1/2"),
                    (1, PAGE_NS, "Example/1/1"),
                    (1, PAGE_NS, "Example/1/9"),
                ],
                transclusions: vec![(4, PAGE_NS, "Example/1/1")],
                categories: vec![(3, "Proofread"), (2, "Not_proofread")],
            }
        }

        pub(crate) fn write(&self, path: &Path, schema: LinkSchema) {
            let connection = Connection::open(path).expect("open replica");
            connection
                .execute_batch(
                    "CREATE TABLE page (
                        page_id INTEGER PRIMARY KEY,
                        page_namespace INTEGER NOT NULL,
                        page_title TEXT NOT NULL
                    );
                    CREATE TABLE linktarget (
                        lt_id INTEGER PRIMARY KEY,
                        lt_namespace INTEGER NOT NULL,
                        lt_title TEXT NOT NULL
                    );
                    CREATE TABLE templatelinks (
                        tl_from INTEGER NOT NULL,
                        tl_target_id INTEGER,
                        tl_namespace INTEGER,
                        tl_title TEXT
                    );
                    CREATE TABLE pagelinks (
                        pl_from INTEGER NOT NULL,
                        pl_namespace INTEGER NOT NULL,
                        pl_title TEXT NOT NULL
                    );
                    CREATE TABLE categorylinks (
                        cl_from INTEGER NOT NULL,
                        cl_to TEXT NOT NULL
                    );",
                )
                .expect("create replica schema");

            for (id, namespace, title) in &self.pages {
                connection
                    .execute(
                        "INSERT INTO page (page_id, page_namespace, page_title) VALUES (?1, ?2, ?3)",
                        params![id, namespace, title],
                    )
                    .expect("insert page");
            }

            let mut targets = HashMap::<(i64, &str), i64>::new();
            let mut target_id = |connection: &Connection, namespace: i64, title: &'static str| {
                let next = targets.len() as i64 + 1;
                *targets.entry((namespace, title)).or_insert_with(|| {
                    connection
                        .execute(
                            "INSERT INTO linktarget (lt_id, lt_namespace, lt_title) VALUES (?1, ?2, ?3)",
                            params![next, namespace, title],
                        )
                        .expect("insert linktarget");
                    next
                })
            };

            for (from, namespace, title) in &self.links {
                match schema {
                    LinkSchema::LinkTarget => {
                        let id = target_id(&connection, *namespace, *title);
                        connection
                            .execute(
                                "INSERT INTO templatelinks (tl_from, tl_target_id) VALUES (?1, ?2)",
                                params![from, id],
                            )
                            .expect("insert index templatelink");
                    }
                    LinkSchema::PageLinks => {
                        connection
                            .execute(
                                "INSERT INTO pagelinks (pl_from, pl_namespace, pl_title) VALUES (?1, ?2, ?3)",
                                params![from, namespace, title],
                            )
                            .expect("insert pagelink");
                    }
                }
            }

            for (from, namespace, title) in &self.transclusions {
                let id = target_id(&connection, *namespace, *title);
                connection
                    .execute(
                        "INSERT INTO templatelinks (tl_from, tl_target_id, tl_namespace, tl_title)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![from, id, namespace, title],
                    )
                    .expect("insert transclusion");
            }

            for (from, category) in &self.categories {
                connection
                    .execute(
                        "INSERT INTO categorylinks (cl_from, cl_to) VALUES (?1, ?2)",
                        params![from, category],
                    )
                    .expect("insert category");
            }
        }
    }

    fn request(index_title: &str) -> ClassifyRequest<'_> {
        ClassifyRequest {
            domain: "https://en.wikisource.org",
            page_namespace_id: PAGE_NS,
            index_namespace_id: INDEX_NS,
            page_namespace_name: "Page",
            index_title,
        }
    }

    fn open_fixture(fixture: &ReplicaFixture, schema: LinkSchema) -> (tempfile::TempDir, SqliteContentStore) {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("enwikisource_p.db");
        fixture.write(&path, schema);
        let connection = Connection::open(&path).expect("open");
        (temp, SqliteContentStore::new(connection, schema))
    }

    #[test]
    fn sort_key_reads_numeric_suffix() {
        assert_eq!(sort_key("Foo/12"), 12);
        assert_eq!(sort_key("Foo"), 1);
        assert_eq!(sort_key("Foo/bar"), 1);
        assert_eq!(sort_key("Foo.djvu/3/7"), 7);
        assert_eq!(sort_key("Foo/"), 1);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let mut links = vec![
            PageLink {
                title: "a".to_string(),
                sort_key: 3,
            },
            PageLink {
                title: "b".to_string(),
                sort_key: 1,
            },
            PageLink {
                title: "c".to_string(),
                sort_key: 1,
            },
            PageLink {
                title: "d".to_string(),
                sort_key: 2,
            },
        ];
        sort_page_links(&mut links);
        let order = links
            .iter()
            .map(|link| (link.title.as_str(), link.sort_key))
            .collect::<Vec<_>>();
        assert_eq!(order, vec![("b", 1), ("c", 1), ("d", 2), ("a", 3)]);
    }

    #[test]
    fn status_label_is_lowercased_with_spaces() {
        assert_eq!(normalize_status("Problematic_Pages"), "problematic pages");
        assert_eq!(normalize_status("Proofread"), "proofread");
    }

    #[test]
    fn classifies_by_transclusion_in_page_order() {
        let (_temp, store) = open_fixture(&ReplicaFixture::example(), LinkSchema::LinkTarget);
        let result = classify_index(&store, &request("Example/1")).expect("classify");

        assert_eq!(
            result.transcluded,
            vec![ResultRow {
                domain: "https://en.wikisource.org".to_string(),
                namespace_name: "Page".to_string(),
                title: "Example/1/1".to_string(),
                status: Some("proofread".to_string()),
            }]
        );
        assert_eq!(result.not_transcluded.len(), 1);
        assert_eq!(result.not_transcluded[0].title, "Example/1/2");
        assert_eq!(
            result.not_transcluded[0].status.as_deref(),
            Some("not proofread")
        );
    }

    #[test]
    fn legacy_pagelinks_schema_gives_same_result() {
        let fixture = ReplicaFixture::example();
        let (_a, modern) = open_fixture(&fixture, LinkSchema::LinkTarget);
        let (_b, legacy) = open_fixture(&fixture, LinkSchema::PageLinks);
        assert_eq!(
            classify_index(&modern, &request("Example/1")).expect("modern"),
            classify_index(&legacy, &request("Example/1")).expect("legacy"),
        );
    }

    #[test]
    fn transclusions_outside_main_namespace_do_not_count() {
        let mut fixture = ReplicaFixture::example();
        fixture.pages.push((5, 2, "Someone/Sandbox"));
        fixture.transclusions.push((5, PAGE_NS, "Example/1/2"));
        let (_temp, store) = open_fixture(&fixture, LinkSchema::LinkTarget);

        let status = page_status(&store, PAGE_NS, "Example/1/2").expect("status");
        assert_eq!(status.transclusion_count, 0);
        let status = page_status(&store, PAGE_NS, "Example/1/1").expect("status");
        assert_eq!(status.transclusion_count, 1);
    }

    #[test]
    fn first_category_wins_in_name_order() {
        let mut fixture = ReplicaFixture::example();
        fixture.categories.push((3, "Validated"));
        fixture.categories.push((3, "Maintenance"));
        let (_temp, store) = open_fixture(&fixture, LinkSchema::LinkTarget);

        let status = page_status(&store, PAGE_NS, "Example/1/1").expect("status");
        assert_eq!(status.proofread_status.as_deref(), Some("maintenance"));
    }

    #[test]
    fn unknown_index_has_no_rows() {
        let (_temp, store) = open_fixture(&ReplicaFixture::example(), LinkSchema::LinkTarget);
        let result = classify_index(&store, &request("Missing.djvu")).expect("classify");
        assert_eq!(result, Default::default());
    }

    struct ScriptedStore {
        links: Vec<&'static str>,
        counts: HashMap<&'static str, u64>,
    }

    impl ContentStore for ScriptedStore {
        fn page_links(&self, _: i64, _: i64, _: &str) -> Result<Vec<String>> {
            Ok(self.links.iter().map(|title| title.to_string()).collect())
        }

        fn transclusion_count(&self, _: i64, title: &str) -> Result<u64> {
            Ok(self.counts.get(title).copied().unwrap_or(0))
        }

        fn categories(&self, _: i64, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn zero_count_pages_never_land_in_transcluded_bucket() {
        let store = ScriptedStore {
            links: vec!["B/3", "B/1", "B/x", "B/2"],
            counts: HashMap::from([("B/1", 2), ("B/2", 0)]),
        };
        let result = classify_index(&store, &request("B")).expect("classify");
        let titles = |rows: &[ResultRow]| rows.iter().map(|row| row.title.clone()).collect::<Vec<_>>();

        assert_eq!(titles(&result.transcluded), vec!["B/1"]);
        assert_eq!(titles(&result.not_transcluded), vec!["B/x", "B/2", "B/3"]);
        assert!(result.not_transcluded.iter().all(|row| row.status.is_none()));
    }

    #[test]
    fn row_links_point_at_live_page() {
        let row = ResultRow {
            domain: "https://en.wikisource.org".to_string(),
            namespace_name: "Page".to_string(),
            title: "Café_(1902).djvu/4".to_string(),
            status: None,
        };
        assert_eq!(
            row.href(),
            "https://en.wikisource.org/wiki/Page:Caf%C3%A9_(1902).djvu/4"
        );
        assert_eq!(row.label(), "Page:Café (1902).djvu/4");
    }

    #[test]
    fn content_source_opens_replica_under_storage_host() {
        let temp = tempdir().expect("tempdir");
        let source = SqliteContentSource::new(temp.path(), LinkSchema::LinkTarget);
        let profile = ConnectionProfile {
            storage_host: "enwikisource.labsdb".to_string(),
            web_domain: "https://en.wikisource.org".to_string(),
        };
        let path = source.replica_path("enwikisource", &profile);
        assert!(path.ends_with("enwikisource.labsdb/enwikisource_p.db"));
        assert!(source.open("enwikisource", &profile).is_err());

        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        ReplicaFixture::example().write(&path, LinkSchema::LinkTarget);
        let store = source.open("enwikisource", &profile).expect("open");
        assert_eq!(
            store
                .page_links(PAGE_NS, INDEX_NS, "Example/1")
                .expect("links")
                .len(),
            2
        );
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cache::TtlCache;

const NAMESPACE_QUERY: &[(&str, &str)] = &[
    ("action", "query"),
    ("meta", "proofreadinfo|siteinfo"),
    ("piprop", "namespaces"),
    ("siprop", "namespaces"),
    ("format", "json"),
];

/// Page and Index namespaces of a wiki running ProofreadPage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceInfo {
    pub page_namespace_id: i64,
    pub index_namespace_id: i64,
    pub page_namespace_name: String,
    pub index_namespace_name: String,
    pub names: BTreeMap<i64, String>,
}

pub trait SiteInfoApi: Send + Sync {
    /// Raw `meta=proofreadinfo|siteinfo` response for the wiki at `domain`.
    fn fetch_namespace_metadata(&self, domain: &str) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct MediaWikiSiteInfo {
    user_agent: String,
    timeout: Duration,
}

impl MediaWikiSiteInfo {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
        }
    }

    fn api_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build MediaWiki HTTP client")
    }
}

impl SiteInfoApi for MediaWikiSiteInfo {
    fn fetch_namespace_metadata(&self, domain: &str) -> Result<Value> {
        let api_url = api_url(domain);
        let response = self
            .api_client()?
            .get(&api_url)
            .header("User-Agent", self.user_agent.clone())
            .query(NAMESPACE_QUERY)
            .send()
            .with_context(|| format!("failed to call {api_url}"))?;

        let status = response.status();
        let body = response
            .text()
            .context("failed to read MediaWiki API response body")?;
        decode_api_response(&api_url, status, &body)
    }
}

/// Turn a raw `api.php` reply into its JSON payload, failing on non-2xx
/// statuses, undecodable bodies and MediaWiki `error` objects.
pub fn decode_api_response(api_url: &str, status: StatusCode, body: &str) -> Result<Value> {
    if !status.is_success() {
        bail!("MediaWiki API request to {api_url} failed with HTTP {status}");
    }
    let payload: Value =
        serde_json::from_str(body).context("failed to decode MediaWiki API JSON response")?;
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(payload)
}

pub fn api_url(domain: &str) -> String {
    format!("{}/w/api.php", domain.trim().trim_end_matches('/'))
}

/// Pull the ProofreadPage namespaces out of an API response. `None` when
/// the extension is absent or its namespaces have no site name.
pub fn parse_extension_namespaces(payload: &Value) -> Option<NamespaceInfo> {
    let query = payload.get("query")?;
    let proofread = query.get("proofreadnamespaces")?;
    let page_namespace_id = proofread.get("page")?.get("id")?.as_i64()?;
    let index_namespace_id = proofread.get("index")?.get("id")?.as_i64()?;

    let mut names = BTreeMap::new();
    if let Some(namespaces) = query.get("namespaces").and_then(Value::as_object) {
        for (key, entry) in namespaces {
            let Ok(id) = key.parse::<i64>() else {
                continue;
            };
            let name = entry
                .get("*")
                .or_else(|| entry.get("name"))
                .and_then(Value::as_str);
            if let Some(name) = name {
                names.insert(id, name.to_string());
            }
        }
    }

    Some(NamespaceInfo {
        page_namespace_name: names.get(&page_namespace_id)?.clone(),
        index_namespace_name: names.get(&index_namespace_id)?.clone(),
        page_namespace_id,
        index_namespace_id,
        names,
    })
}

pub struct NamespaceDiscoverer {
    api: Box<dyn SiteInfoApi>,
    cache: TtlCache<String, Option<NamespaceInfo>>,
}

impl NamespaceDiscoverer {
    pub fn new(api: Box<dyn SiteInfoApi>, cache: TtlCache<String, Option<NamespaceInfo>>) -> Self {
        Self { api, cache }
    }

    /// `Ok(None)` means the wiki does not run ProofreadPage.
    pub fn discover(&self, domain: &str) -> Result<Option<NamespaceInfo>> {
        self.cache.get_or_try_insert_with(&domain.to_string(), || {
            let payload = self.api.fetch_namespace_metadata(domain)?;
            let info = parse_extension_namespaces(&payload);
            debug!(domain, supported = info.is_some(), "discovered namespaces");
            Ok(info)
        })
    }
}

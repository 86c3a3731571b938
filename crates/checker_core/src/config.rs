use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::links::LinkSchema;

pub const DEFAULT_DB: &str = "enwikisource";
pub const DEFAULT_HOST_SUFFIX: &str = "labsdb";
pub const DEFAULT_USER_AGENT: &str = "checker/0.2";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60 * 24;
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CheckerConfig {
    #[serde(default)]
    pub checker: CheckerSection,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub paths: PathsSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CheckerSection {
    pub default_db: Option<String>,
    pub host_suffix: Option<String>,
    pub link_schema: Option<LinkSchema>,
    pub cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ApiSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ServerSection {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PathsSection {
    pub meta_db: Option<PathBuf>,
    pub replica_dir: Option<PathBuf>,
}

impl CheckerConfig {
    /// Resolve the fallback wiki: env CHECKER_DEFAULT_DB > config > DEFAULT_DB.
    pub fn default_db(&self) -> String {
        self.default_db_with_lookup(|key| env::var(key).ok())
    }

    /// Resolve the storage host suffix: env CHECKER_HOST_SUFFIX > config > DEFAULT_HOST_SUFFIX.
    pub fn host_suffix(&self) -> String {
        self.host_suffix_with_lookup(|key| env::var(key).ok())
    }

    /// Resolve user agent: env CHECKER_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        self.user_agent_with_lookup(|key| env::var(key).ok())
    }

    /// Resolve API timeout: env CHECKER_HTTP_TIMEOUT_MS > config > DEFAULT_TIMEOUT_MS.
    pub fn timeout(&self) -> Duration {
        self.timeout_with_lookup(|key| env::var(key).ok())
    }

    /// Resolve listen address: env CHECKER_BIND > config > DEFAULT_BIND.
    pub fn bind(&self) -> String {
        self.bind_with_lookup(|key| env::var(key).ok())
    }

    pub fn link_schema(&self) -> LinkSchema {
        self.checker.link_schema.unwrap_or_default()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(
            self.checker
                .cache_ttl_secs
                .unwrap_or(DEFAULT_CACHE_TTL_SECS),
        )
    }

    fn default_db_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        env_or(&lookup_env, "CHECKER_DEFAULT_DB")
            .or_else(|| self.checker.default_db.clone())
            .unwrap_or_else(|| DEFAULT_DB.to_string())
    }

    fn host_suffix_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        env_or(&lookup_env, "CHECKER_HOST_SUFFIX")
            .or_else(|| self.checker.host_suffix.clone())
            .unwrap_or_else(|| DEFAULT_HOST_SUFFIX.to_string())
    }

    fn user_agent_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        env_or(&lookup_env, "CHECKER_USER_AGENT")
            .or_else(|| self.api.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    fn timeout_with_lookup<F>(&self, lookup_env: F) -> Duration
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = env_or(&lookup_env, "CHECKER_HTTP_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.api.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Duration::from_millis(millis)
    }

    fn bind_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        env_or(&lookup_env, "CHECKER_BIND")
            .or_else(|| self.server.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
    }
}

fn env_or<F>(lookup_env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Load and parse a CheckerConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<CheckerConfig> {
    if !config_path.exists() {
        return Ok(CheckerConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: CheckerConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, CheckerConfig::default());
    }

    #[test]
    fn load_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[checker]
default_db = "frwikisource"
host_suffix = "analytics.db.svc.wikimedia.cloud"
link_schema = "pagelinks"
cache_ttl_secs = 600

[api]
user_agent = "checker-test/1.0"
timeout_ms = 5000

[server]
bind = "0.0.0.0:8080"

[paths]
meta_db = "/data/meta_p.db"
replica_dir = "/data/replicas"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        let no_env = |_: &str| None;
        assert_eq!(config.default_db_with_lookup(no_env), "frwikisource");
        assert_eq!(
            config.host_suffix_with_lookup(no_env),
            "analytics.db.svc.wikimedia.cloud"
        );
        assert_eq!(config.link_schema(), LinkSchema::PageLinks);
        assert_eq!(config.cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.user_agent_with_lookup(no_env), "checker-test/1.0");
        assert_eq!(config.timeout_with_lookup(no_env), Duration::from_millis(5000));
        assert_eq!(config.bind_with_lookup(no_env), "0.0.0.0:8080");
        assert_eq!(
            config.paths.replica_dir.as_deref(),
            Some(Path::new("/data/replicas"))
        );
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[checker\ndefault_db = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn load_config_rejects_unknown_link_schema() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[checker]\nlink_schema = \"imagelinks\"\n").expect("write config");
        assert!(load_config(&config_path).is_err());
    }

    #[test]
    fn defaults_apply_without_config_or_env() {
        let config = CheckerConfig::default();
        let no_env = |_: &str| None;
        assert_eq!(config.default_db_with_lookup(no_env), "enwikisource");
        assert_eq!(config.host_suffix_with_lookup(no_env), "labsdb");
        assert_eq!(config.user_agent_with_lookup(no_env), "checker/0.2");
        assert_eq!(config.bind_with_lookup(no_env), "127.0.0.1:8000");
        assert_eq!(config.link_schema(), LinkSchema::LinkTarget);
        assert_eq!(config.cache_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn env_overrides_config_values() {
        let config = CheckerConfig {
            checker: CheckerSection {
                default_db: Some("dewikisource".to_string()),
                ..CheckerSection::default()
            },
            api: ApiSection {
                timeout_ms: Some(1_000),
                ..ApiSection::default()
            },
            ..CheckerConfig::default()
        };
        let env = HashMap::from([
            ("CHECKER_DEFAULT_DB".to_string(), " itwikisource ".to_string()),
            ("CHECKER_HTTP_TIMEOUT_MS".to_string(), "not-a-number".to_string()),
        ]);
        let lookup = |key: &str| env.get(key).cloned();
        assert_eq!(config.default_db_with_lookup(lookup), "itwikisource");
        assert_eq!(config.timeout_with_lookup(lookup), Duration::from_millis(1_000));
    }
}

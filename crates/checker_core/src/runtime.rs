use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const STATE_DIR_NAME: &str = ".checker";
pub const META_DB_FILENAME: &str = "meta_p.db";
pub const REPLICA_DIR_NAME: &str = "replicas";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

/// Filesystem locations the tool reads from. The metadata store and replica
/// directory may be overridden again by `[paths]` in the config file.
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub meta_db_path: PathBuf,
    pub replica_dir: PathBuf,
    pub data_source: ValueSource,
    pub config_source: ValueSource,
    pub meta_source: ValueSource,
    pub replica_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "data_dir={} ({})\nconfig_path={} ({})\nmeta_db={} ({})\nreplica_dir={} ({})",
            normalize_for_display(&self.data_dir),
            self.data_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.meta_db_path),
            self.meta_source.as_str(),
            normalize_for_display(&self.replica_dir),
            self.replica_source.as_str(),
        )
    }

    /// Apply `[paths]` entries from the loaded config. Relative values are
    /// taken from the data directory.
    pub fn with_config(mut self, config: &crate::config::CheckerConfig) -> Self {
        if let Some(meta_db) = config.paths.meta_db.as_deref() {
            self.meta_db_path = absolutize(meta_db, &self.data_dir);
            self.meta_source = ValueSource::Config;
        }
        if let Some(replica_dir) = config.paths.replica_dir.as_deref() {
            self.replica_dir = absolutize(replica_dir, &self.data_dir);
            self.replica_source = ValueSource::Config;
        }
        self
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    Ok(resolve_paths_with_lookup(context, overrides, |key| {
        env::var(key).ok()
    }))
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> ResolvedPaths
where
    F: Fn(&str) -> Option<String>,
{
    let (data_dir, data_source) = if let Some(path) = overrides.data_dir.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("CHECKER_DATA_DIR")) {
        (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        )
    } else {
        (context.cwd.join(STATE_DIR_NAME), ValueSource::Default)
    };

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("CHECKER_CONFIG")) {
        (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        )
    } else {
        (data_dir.join("config.toml"), ValueSource::Default)
    };

    ResolvedPaths {
        meta_db_path: data_dir.join(META_DB_FILENAME),
        replica_dir: data_dir.join(REPLICA_DIR_NAME),
        data_dir,
        config_path,
        data_source,
        config_source,
        meta_source: ValueSource::Default,
        replica_source: ValueSource::Default,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

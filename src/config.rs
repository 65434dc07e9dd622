use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub const STORE_ENV: &str = "GROOVELOG_STORE";
const CONFIG_FILE: &str = "config.yml";
const STORE_FILE: &str = "store.yml";
const LOG_FILE: &str = "groovelog.log";

/// Optional settings read from `config.yml`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub export_dir: Option<PathBuf>,
}

impl Config {
    /// An explicit path must exist; the platform default may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (project_dirs()?.config_dir().join(CONFIG_FILE), false),
        };
        if !path.exists() {
            if required {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            return Ok(Config::default());
        }
        let data = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
        Self::parse(&data).with_context(|| format!("parsing {:?}", path))
    }

    fn parse(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    /// `--store` beats `$GROOVELOG_STORE`, which beats `store_path`.
    pub fn resolve_store_path(
        &self,
        flag: Option<&Path>,
        env: Option<OsString>,
    ) -> Result<PathBuf> {
        if let Some(path) = flag {
            return Ok(path.to_path_buf());
        }
        if let Some(value) = env.filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(value));
        }
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        Ok(project_dirs()?.data_dir().join(STORE_FILE))
    }

    pub fn resolve_log_path(&self, store_path: &Path) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| {
            store_path
                .parent()
                .map(|dir| dir.join(LOG_FILE))
                .unwrap_or_else(|| PathBuf::from(LOG_FILE))
        })
    }

    pub fn resolve_export_dir(&self, flag: Option<&Path>) -> Result<PathBuf> {
        match flag.or(self.export_dir.as_deref()) {
            Some(dir) => Ok(dir.to_path_buf()),
            None => std::env::current_dir().context("locating current directory"),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "groovelog").context("locating data directory")
}

//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::jobs::{ListQuery, Sort};

/// Top-level configuration stored in `import_tracker.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the Import API lives and how to authenticate.
    pub api: ApiCfg,
    /// Polling cadence for in-flight jobs.
    pub polling: PollingCfg,
    /// Defaults for the job list.
    pub listing: ListingCfg,
    /// Client-side upload checks.
    pub upload: UploadCfg,
}

/// Import API endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiCfg {
    /// Base URL the `/imports` routes hang off.
    pub base_url: String,
    /// Bearer token sent with every request (empty to skip).
    pub token: String,
}

/// Polling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingCfg {
    /// Delay between the end of one status fetch and the start of the next.
    pub interval_ms: u64,
}

/// Job list defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingCfg {
    /// Jobs per page.
    pub page_size: u32,
    /// Sort order, e.g. `createdAt,desc`.
    pub sort: Sort,
}

/// Upload validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadCfg {
    /// Extensions accepted before upload (without the dot).
    pub allowed_extensions: Vec<String>,
}

impl Default for ApiCfg {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/admin".into(),
            token: "".into(),
        }
    }
}

impl Default for PollingCfg {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

impl Default for ListingCfg {
    fn default() -> Self {
        Self {
            page_size: 10,
            sort: Sort::NEWEST_FIRST,
        }
    }
}

impl Default for UploadCfg {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["csv".into()],
        }
    }
}

impl PollingCfg {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ListingCfg {
    /// Query for the first page with the configured size and sort.
    pub fn first_page(&self) -> ListQuery {
        ListQuery::first_page(self.page_size, self.sort)
    }
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }
}

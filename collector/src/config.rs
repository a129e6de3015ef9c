//! TOML configuration for the `intm` binary.
//!
//! ```toml
//! queries = ["org:octo is:pr is:open"]
//! update_query = "org:octo is:pr is:closed"
//! wait_seconds = 300
//! update_batch_size = 50
//!
//! [[recent_queries]]
//! query = "org:octo is:pr"
//! window_minutes = 60
//!
//! [github]
//! api_url = "https://api.github.com/graphql"
//! timeout_seconds = 30
//! page_size = 100
//! ```

use crate::collector::CollectorConfig;
use crate::query::{CollectQuery, ConstantCollectQuery, RecentlyUpdatedPullRequests};
use github::GithubConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {message}")]
    Invalid { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecentQueryConfig {
    pub query: String,
    pub window_minutes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GithubSection {
    pub api_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub recent_queries: Vec<RecentQueryConfig>,
    pub update_query: Option<String>,
    pub wait_seconds: Option<u64>,
    pub update_batch_size: Option<usize>,
    #[serde(default)]
    pub github: GithubSection,
}

impl FileConfig {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if let Some(blank) = self.queries.iter().find(|q| q.trim().is_empty()) {
            return invalid(format!("query '{blank}' is blank"));
        }

        for recent in &self.recent_queries {
            if recent.query.trim().is_empty() {
                return invalid("recent query is blank".to_string());
            }
            if recent.window_minutes <= 0 {
                return invalid(format!(
                    "window_minutes for '{}' must be positive",
                    recent.query
                ));
            }
            let reaches_past_range = chrono::Duration::try_minutes(recent.window_minutes)
                .and_then(|window| chrono::Utc::now().checked_sub_signed(window))
                .is_none();
            if reaches_past_range {
                return invalid(format!(
                    "window_minutes for '{}' reaches outside the supported date range",
                    recent.query
                ));
            }
        }

        if matches!(&self.update_query, Some(q) if q.trim().is_empty()) {
            return invalid("update_query is blank".to_string());
        }

        Ok(())
    }

    /// Collect queries in file order: constant queries first, then the
    /// recently-updated ones.
    pub fn collect_queries(&self) -> Vec<Box<dyn CollectQuery>> {
        let constant = self
            .queries
            .iter()
            .map(|q| Box::new(ConstantCollectQuery::new(q.as_str())) as Box<dyn CollectQuery>);
        let recent = self.recent_queries.iter().map(|r| {
            Box::new(RecentlyUpdatedPullRequests::new(
                r.query.as_str(),
                chrono::Duration::try_minutes(r.window_minutes).unwrap_or(chrono::Duration::MAX),
            )) as Box<dyn CollectQuery>
        });
        constant.chain(recent).collect()
    }

    pub fn update_collect_query(&self) -> Option<Box<dyn CollectQuery>> {
        self.update_query
            .as_deref()
            .map(|q| Box::new(ConstantCollectQuery::new(q)) as Box<dyn CollectQuery>)
    }

    /// Overlays file values on `base`.
    pub fn collector_config(&self, base: CollectorConfig) -> CollectorConfig {
        let mut config = base;
        if let Some(seconds) = self.wait_seconds {
            config = config.with_wait_time(Duration::from_secs(seconds));
        }
        if let Some(size) = self.update_batch_size {
            config = config.with_update_batch_size(size);
        }
        config
    }

    /// Overlays the `[github]` section on `base`.
    pub fn github_config(&self, base: GithubConfig) -> GithubConfig {
        let mut config = base;
        if let Some(api_url) = &self.github.api_url {
            config = config.with_api_url(api_url.as_str());
        }
        if let Some(seconds) = self.github.timeout_seconds {
            config = config.with_timeout(Duration::from_secs(seconds));
        }
        if let Some(page_size) = self.github.page_size {
            config = config.with_page_size(page_size);
        }
        config
    }
}

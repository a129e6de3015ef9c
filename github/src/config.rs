use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com/graphql";

/// GitHub caps `first` on connections at 100.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub api_url: String,
    #[serde(skip_serializing, default)]
    pub token: String,
    pub timeout: Duration,
    pub page_size: u32,
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: String::new(),
            timeout: Duration::from_secs(30),
            page_size: MAX_PAGE_SIZE,
            user_agent: "intm".to_string(),
        }
    }
}

impl GithubConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self::default().with_token(token)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_url.is_empty() {
            return Err("API URL cannot be empty".to_string());
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err("API URL must start with http:// or https://".to_string());
        }

        if self.token.trim().is_empty() {
            return Err("GitHub token cannot be empty".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(format!("Page size must be between 1 and {MAX_PAGE_SIZE}"));
        }

        if self.user_agent.is_empty() {
            return Err("User agent cannot be empty".to_string());
        }

        Ok(())
    }
}

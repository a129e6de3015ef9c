use crate::types::PullRequest;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GithubError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed")]
    Authentication,

    #[error("GraphQL error: {}", messages.join("; "))]
    GraphQl { messages: Vec<String> },

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

pub type GithubResult<T> = Result<T, GithubError>;

/// Anything that can answer pull-request queries.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// Runs a GitHub search and returns every matching pull request across all
    /// pages. Issues and other node types in the result are dropped.
    async fn search_pull_requests(&self, query: &str) -> GithubResult<Vec<PullRequest>>;

    /// Fetches pull requests by node id. Unknown ids are dropped.
    async fn pull_requests_by_ids(&self, ids: &[String]) -> GithubResult<Vec<PullRequest>>;

    async fn health_check(&self) -> GithubResult<()>;

    fn provider_name(&self) -> &'static str;
}

pub mod client;
pub mod config;
pub mod provider;
pub mod types;

pub use client::GithubClient;
pub use config::{GithubConfig, DEFAULT_API_URL, MAX_PAGE_SIZE};
pub use provider::{GithubError, GithubResult, PullRequestSource};
pub use types::{
    PullRequest, PullRequestState, PullRequestUri, Repository, UriParseError, PULL_REQUEST_FIELDS,
};

pub mod prelude {
    pub use crate::client::*;
    pub use crate::config::*;
    pub use crate::provider::*;
    pub use crate::types::*;
}

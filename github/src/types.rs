use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// GraphQL selection requested for every pull request.
///
/// Must stay in sync with the fields of [`PullRequest`], which rejects
/// anything it does not know.
pub const PULL_REQUEST_FIELDS: &str = "__typename id number title url state updatedAt repository { nameWithOwner }";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Repository {
    pub name_with_owner: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PullRequest {
    #[serde(
        rename = "__typename",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub typename: Option<String>,
    pub id: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: PullRequestState,
    pub updated_at: DateTime<Utc>,
    pub repository: Repository,
}

impl PullRequest {
    /// `owner/name#number`
    pub fn uri(&self) -> String {
        format!("{}#{}", self.repository.name_with_owner, self.number)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid pull request uri '{uri}': {reason}")]
pub struct UriParseError {
    pub uri: String,
    pub reason: String,
}

/// Parsed form of `owner/name#number`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PullRequestUri {
    pub owner_with_name: String,
    pub number: u64,
}

impl PullRequestUri {
    pub fn parse(uri: &str) -> Result<Self, UriParseError> {
        let invalid = |reason: &str| UriParseError {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = uri.split('#');
        let (owner_with_name, number) = match (parts.next(), parts.next(), parts.next()) {
            (Some(repo), Some(number), None) => (repo, number),
            _ => return Err(invalid("expected exactly one '#'")),
        };

        if owner_with_name.is_empty() {
            return Err(invalid("repository is empty"));
        }

        let number = number
            .parse::<u64>()
            .map_err(|_| invalid("number is not a positive integer"))?;

        Ok(Self {
            owner_with_name: owner_with_name.to_string(),
            number,
        })
    }
}

impl FromStr for PullRequestUri {
    type Err = UriParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PullRequestUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner_with_name, self.number)
    }
}

use crate::config::GithubConfig;
use crate::provider::{GithubError, GithubResult, PullRequestSource};
use crate::types::{PullRequest, PULL_REQUEST_FIELDS};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use tracing::{debug, error, info, warn};

const PULL_REQUEST_TYPENAME: &str = "PullRequest";
const NOT_FOUND: &str = "NOT_FOUND";

#[derive(Debug, Clone, Serialize)]
struct GraphQlRequest {
    query: String,
    variables: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphQlErrorItem {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchConnection {
    page_info: PageInfo,
    nodes: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchData {
    search: SearchConnection,
}

#[derive(Debug, Clone, Deserialize)]
struct NodesData {
    nodes: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Viewer {
    login: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ViewerData {
    viewer: Viewer,
}

fn search_query() -> String {
    format!(
        "query($q: String!, $first: Int!, $after: String) {{ \
         search(query: $q, type: ISSUE, first: $first, after: $after) {{ \
         pageInfo {{ hasNextPage endCursor }} \
         nodes {{ ... on PullRequest {{ {PULL_REQUEST_FIELDS} }} }} }} }}"
    )
}

fn nodes_query() -> String {
    format!(
        "query($ids: [ID!]!) {{ \
         nodes(ids: $ids) {{ ... on PullRequest {{ {PULL_REQUEST_FIELDS} }} }} }}"
    )
}

fn graphql_error(errors: Vec<GraphQlErrorItem>) -> GithubError {
    GithubError::GraphQl {
        messages: errors.into_iter().map(|e| e.message).collect(),
    }
}

fn missing_data() -> GithubError {
    GithubError::Unknown {
        message: "GraphQL response carried neither data nor errors".to_string(),
    }
}

/// Unwraps a GraphQL envelope. Any reported error fails the whole response,
/// even when partial data came back alongside it.
fn parse_response<T: DeserializeOwned>(body: Value) -> GithubResult<T> {
    let response: GraphQlResponse<T> = serde_json::from_value(body)?;

    if !response.errors.is_empty() {
        return Err(graphql_error(response.errors));
    }

    response.data.ok_or_else(missing_data)
}

/// Unwraps a `nodes(ids:)` envelope. GitHub answers a stale or deleted id
/// with `null` in its slot plus a `NOT_FOUND` error; those are dropped and
/// the resolved nodes kept. Any other error fails the response.
fn parse_nodes_response(body: Value) -> GithubResult<Vec<PullRequest>> {
    let response: GraphQlResponse<NodesData> = serde_json::from_value(body)?;

    let only_not_found = response
        .errors
        .iter()
        .all(|e| e.kind.as_deref() == Some(NOT_FOUND));
    if !only_not_found {
        return Err(graphql_error(response.errors));
    }

    let data = response.data.ok_or_else(|| {
        if response.errors.is_empty() {
            missing_data()
        } else {
            graphql_error(response.errors.clone())
        }
    })?;

    for unresolved in &response.errors {
        warn!("Dropping unresolved pull request: {}", unresolved.message);
    }

    pull_requests_from_nodes(data.nodes)
}

/// Follows search cursors until GitHub reports no further page. A page that
/// claims a successor but carries no cursor ends the walk.
async fn collect_pages<F, Fut>(mut fetch_page: F) -> GithubResult<Vec<PullRequest>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = GithubResult<SearchConnection>>,
{
    let mut pull_requests = Vec::new();
    let mut after: Option<String> = None;

    loop {
        let page = fetch_page(after.take()).await?;
        pull_requests.extend(pull_requests_from_nodes(page.nodes)?);

        match page.page_info {
            PageInfo {
                has_next_page: true,
                end_cursor: Some(cursor),
            } => after = Some(cursor),
            _ => break,
        }
    }

    Ok(pull_requests)
}

/// Keeps only pull-request nodes; search results may contain issues and
/// lookups by id may contain nulls.
fn pull_requests_from_nodes(nodes: Vec<Value>) -> GithubResult<Vec<PullRequest>> {
    nodes
        .into_iter()
        .filter(|node| {
            node.get("__typename").and_then(Value::as_str) == Some(PULL_REQUEST_TYPENAME)
        })
        .map(|node| serde_json::from_value(node).map_err(GithubError::from))
        .collect()
}

fn status_error(status: StatusCode, body: String) -> GithubError {
    match status.as_u16() {
        401 | 403 => GithubError::Authentication,
        429 => GithubError::RateLimit,
        code if code >= 500 => GithubError::ServiceUnavailable {
            message: format!("GitHub API returned {status}"),
        },
        _ => GithubError::Unknown {
            message: format!("GitHub API error ({status}): {body}"),
        },
    }
}

pub struct GithubClient {
    client: reqwest::Client,
    config: GithubConfig,
}

impl GithubClient {
    pub fn new(config: GithubConfig) -> GithubResult<Self> {
        config
            .validate()
            .map_err(|msg| GithubError::InvalidConfig { message: msg })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GithubError::Unknown {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    fn handle_http_error(err: reqwest::Error) -> GithubError {
        if err.is_timeout() {
            GithubError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            GithubError::ServiceUnavailable {
                message: "Cannot connect to GitHub".to_string(),
            }
        } else if let Some(status) = err.status() {
            status_error(status, String::new())
        } else {
            GithubError::Network(err)
        }
    }

    /// Posts a GraphQL request and returns the raw JSON envelope.
    async fn post(&self, query: String, variables: Value) -> GithubResult<Value> {
        let request = GraphQlRequest { query, variables };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.token)
            .json(&request)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_text));
        }

        response.json().await.map_err(Self::handle_http_error)
    }

    async fn execute<T: DeserializeOwned>(&self, query: String, variables: Value) -> GithubResult<T> {
        parse_response(self.post(query, variables).await?)
    }
}

#[async_trait]
impl PullRequestSource for GithubClient {
    async fn search_pull_requests(&self, query: &str) -> GithubResult<Vec<PullRequest>> {
        debug!("Searching pull requests: {}", query);

        let pull_requests = collect_pages(|after| async move {
            let data: SearchData = self
                .execute(
                    search_query(),
                    json!({ "q": query, "first": self.config.page_size, "after": after }),
                )
                .await?;
            Ok(data.search)
        })
        .await?;

        info!(
            "Search '{}' returned {} pull requests",
            query,
            pull_requests.len()
        );
        Ok(pull_requests)
    }

    async fn pull_requests_by_ids(&self, ids: &[String]) -> GithubResult<Vec<PullRequest>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Fetching {} pull requests by id", ids.len());

        let body = self.post(nodes_query(), json!({ "ids": ids })).await?;
        parse_nodes_response(body)
    }

    async fn health_check(&self) -> GithubResult<()> {
        debug!("Performing health check");

        match self
            .execute::<ViewerData>("query { viewer { login } }".to_string(), json!({}))
            .await
        {
            Ok(data) => {
                info!("Health check passed, authenticated as {}", data.viewer.login);
                Ok(())
            }
            Err(e) => {
                error!("Health check failed: {}", e);
                Err(e)
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "github"
    }
}

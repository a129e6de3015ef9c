//! Live tests against api.github.com. Run with
//! `GITHUB_TOKEN=... cargo test -p github -- --ignored`.

use github::{GithubClient, GithubConfig, PullRequestSource};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(60);
const QUERY: &str = "repo:rust-lang/rust is:pr is:merged 100000";

fn make_client() -> GithubClient {
    let token = std::env::var("GITHUB_TOKEN").expect("GITHUB_TOKEN must be set");
    GithubClient::new(GithubConfig::new(token).with_timeout(TIMEOUT)).expect("client creation")
}

#[tokio::test]
#[ignore]
async fn test_health_check() {
    let client = make_client();

    tokio::time::timeout(TIMEOUT, client.health_check())
        .await
        .expect("health_check timed out")
        .expect("health_check failed");
}

#[tokio::test]
#[ignore]
async fn test_search_then_fetch_by_id() {
    let client = make_client();

    let found = tokio::time::timeout(TIMEOUT, client.search_pull_requests(QUERY))
        .await
        .expect("search timed out")
        .expect("search failed");

    assert!(!found.is_empty(), "search must find the pull request");
    let first = &found[0];
    assert_eq!(first.repository.name_with_owner, "rust-lang/rust");

    let by_id = tokio::time::timeout(TIMEOUT, client.pull_requests_by_ids(&[first.id.clone()]))
        .await
        .expect("lookup timed out")
        .expect("lookup failed");

    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].uri(), first.uri());
}

#[tokio::test]
#[ignore]
async fn test_bad_token_is_authentication_error() {
    let client = GithubClient::new(GithubConfig::new("not-a-token")).expect("client creation");

    let result = client.health_check().await;
    assert!(matches!(result, Err(github::GithubError::Authentication)));
}

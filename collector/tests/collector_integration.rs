//! End-to-end collector behaviour against an in-memory GitHub stand-in.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use collector::{CollectorConfig, FileConfig, PullRequestCollector};
use github::{
    GithubError, GithubResult, PullRequest, PullRequestSource, PullRequestState, Repository,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pretends to be GitHub: holds pull requests and answers the two query
/// shapes the collector sends.
#[derive(Default)]
struct FakeGithub {
    pull_requests: Mutex<BTreeMap<String, PullRequest>>,
    queries: Mutex<Vec<String>>,
}

impl FakeGithub {
    fn upsert(&self, repo: &str, id: &str, number: u64, title: &str, state: PullRequestState) {
        let pr = PullRequest {
            typename: Some("PullRequest".to_string()),
            id: id.to_string(),
            number,
            title: title.to_string(),
            url: format!("https://github.com/{repo}/pull/{number}"),
            state,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            repository: Repository {
                name_with_owner: repo.to_string(),
            },
        };
        self.pull_requests.lock().unwrap().insert(id.to_string(), pr);
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PullRequestSource for FakeGithub {
    async fn search_pull_requests(&self, query: &str) -> GithubResult<Vec<PullRequest>> {
        self.queries.lock().unwrap().push(query.to_string());

        let terms: Vec<&str> = query.split_whitespace().collect();
        if terms.contains(&"broken") {
            return Err(GithubError::ServiceUnavailable {
                message: "502 Bad Gateway".to_string(),
            });
        }

        let repo = terms.iter().find_map(|t| t.strip_prefix("repo:"));
        let want_open = terms.contains(&"is:open");
        let numbers: Vec<u64> = terms.iter().filter_map(|t| t.parse().ok()).collect();

        let pull_requests = self.pull_requests.lock().unwrap();
        Ok(pull_requests
            .values()
            .filter(|pr| repo.map_or(true, |r| pr.repository.name_with_owner == r))
            .filter(|pr| !want_open || pr.state == PullRequestState::Open)
            .filter(|pr| numbers.is_empty() || numbers.contains(&pr.number))
            .cloned()
            .collect())
    }

    async fn pull_requests_by_ids(&self, ids: &[String]) -> GithubResult<Vec<PullRequest>> {
        self.queries.lock().unwrap().push(format!("ids:{}", ids.join(",")));
        let pull_requests = self.pull_requests.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| pull_requests.get(id).cloned())
            .collect())
    }

    async fn health_check(&self) -> GithubResult<()> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

fn build(github: Arc<FakeGithub>, toml: &str) -> PullRequestCollector {
    let file = FileConfig::from_toml_str(toml).expect("valid config");
    PullRequestCollector::new(
        github,
        file.collect_queries(),
        file.update_collect_query(),
        file.collector_config(CollectorConfig::default()),
    )
    .expect("valid collector")
}

#[tokio::test]
async fn test_open_pull_requests_are_collected_and_refreshed() {
    let github = Arc::new(FakeGithub::default());
    github.upsert("octo/app", "PR_1", 1, "Add login", PullRequestState::Open);
    github.upsert("octo/app", "PR_2", 2, "Old work", PullRequestState::Closed);
    github.upsert("octo/lib", "PR_3", 7, "Bump deps", PullRequestState::Open);

    let collector = build(Arc::clone(&github), "queries = [\"is:pr is:open\"]");

    let report = collector.run_cycle().await;
    assert!(report.is_clean());
    assert_eq!(collector.len().await, 2);
    assert!(collector.get("PR_2").await.is_none());

    github.upsert("octo/app", "PR_1", 1, "Add login (v2)", PullRequestState::Open);
    collector.run_cycle().await;

    let refreshed = collector.get("PR_1").await.unwrap();
    assert_eq!(refreshed.pull_request.title, "Add login (v2)");
}

#[tokio::test]
async fn test_closed_pull_request_refreshed_through_update_requests() {
    let github = Arc::new(FakeGithub::default());
    github.upsert("octo/app", "PR_1", 1, "Add login", PullRequestState::Open);
    github.upsert("octo/app", "PR_9", 9, "Retired", PullRequestState::Open);

    let collector = build(Arc::clone(&github), "queries = [\"is:pr is:open\"]");
    collector.run_cycle().await;

    // Once closed, the open query no longer sees them; explicit requests do.
    github.upsert("octo/app", "PR_1", 1, "Add login", PullRequestState::Merged);
    github.upsert("octo/app", "PR_9", 9, "Retired", PullRequestState::Closed);
    collector.request_update_by_id("PR_1").await;
    collector.request_update_by_uri("octo/app#9").await.unwrap();

    collector.run_cycle().await;

    let queries = github.queries();
    assert!(queries.contains(&"ids:PR_1".to_string()));
    assert!(queries.contains(&"repo:octo/app is:pr 9".to_string()));

    assert_eq!(
        collector.get("PR_1").await.unwrap().pull_request.state,
        PullRequestState::Merged
    );
    assert_eq!(
        collector.get("PR_9").await.unwrap().pull_request.state,
        PullRequestState::Closed
    );
    assert!(collector.pending_ids().await.is_empty());
    assert!(collector.pending_uris().await.is_empty());
}

#[tokio::test]
async fn test_outage_on_one_query_keeps_others() {
    let github = Arc::new(FakeGithub::default());
    github.upsert("octo/lib", "PR_3", 7, "Bump deps", PullRequestState::Open);

    let collector = build(
        Arc::clone(&github),
        "queries = [\"broken\", \"repo:octo/lib is:pr\"]\nupdate_query = \"is:pr is:open\"",
    );

    let report = collector.run_cycle().await;

    assert_eq!(report.queries_run, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(collector.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_collection_sees_new_pull_requests() {
    let github = Arc::new(FakeGithub::default());
    github.upsert("octo/app", "PR_1", 1, "Add login", PullRequestState::Open);

    let collector = build(
        Arc::clone(&github),
        "queries = [\"is:pr is:open\"]\nwait_seconds = 0",
    );
    let handle = collector.spawn();

    github.upsert("octo/app", "PR_4", 4, "Late arrival", PullRequestState::Open);

    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.collector().get("PR_4").await.is_none() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("new pull request must be picked up by a later cycle");

    let collector = handle.stop().await.unwrap();
    let uris: Vec<String> = collector
        .snapshot()
        .await
        .iter()
        .map(|c| c.pull_request.uri())
        .collect();
    assert_eq!(uris, vec!["octo/app#1", "octo/app#4"]);
}

//! Background pull-request collection.
//!
//! A [`PullRequestCollector`] keeps an in-memory map of pull requests keyed by
//! node id. Every cycle it:
//!
//! 1. runs each configured [`CollectQuery`] in order,
//! 2. runs the optional update query,
//! 3. refreshes pull requests explicitly flagged as needing an update, first
//!    by id and then by `owner/name#number` uri.
//!
//! Between cycles it waits for `wait_time` or until stopped. Each stored pull
//! request carries the time its data was pulled.

use crate::query::CollectQuery;
use chrono::{DateTime, Utc};
use github::{GithubError, PullRequest, PullRequestSource, PullRequestUri, UriParseError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("GitHub request failed: {0}")]
    Github(#[from] GithubError),

    #[error(transparent)]
    InvalidUri(#[from] UriParseError),

    #[error("Invalid collector configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Collector task failed: {message}")]
    TaskFailed { message: String },
}

pub type CollectorResult<T> = Result<T, CollectorError>;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub wait_time: Duration,
    /// Upper bound on ids, and on uris, refreshed per cycle.
    pub update_batch_size: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(5 * 60),
            update_batch_size: 50,
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    pub fn with_update_batch_size(mut self, update_batch_size: usize) -> Self {
        self.update_batch_size = update_batch_size;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.update_batch_size == 0 {
            return Err("Update batch size must be greater than 0".to_string());
        }

        if self.update_batch_size > github::MAX_PAGE_SIZE as usize {
            return Err(format!(
                "Update batch size must not exceed {}",
                github::MAX_PAGE_SIZE
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PullRequestContainer {
    pub pull_request: PullRequest,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub last_data_pull_at: DateTime<Utc>,
}

impl PullRequestContainer {
    pub fn new(pull_request: PullRequest) -> Self {
        Self {
            pull_request,
            dependencies: Vec::new(),
            last_data_pull_at: Utc::now(),
        }
    }
}

/// Outcome of a single collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub queries_run: usize,
    pub pull_requests_stored: usize,
    pub failures: Vec<String>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
struct CollectorState {
    pull_requests: HashMap<String, PullRequestContainer>,
    needing_update_ids: BTreeSet<String>,
    needing_update_uris: BTreeSet<PullRequestUri>,
    /// Last id handed out for refresh; the next batch starts after it.
    id_cursor: Option<String>,
    /// Last uri handed out for refresh; the next batch starts after it.
    uri_cursor: Option<PullRequestUri>,
}

/// Entries of `set` starting after `cursor` and wrapping around to the
/// beginning, so entries that never resolve cannot starve the rest.
fn rotated<'a, T: Ord>(set: &'a BTreeSet<T>, cursor: Option<&'a T>) -> impl Iterator<Item = &'a T> {
    let after_cursor = move |item: &&T| cursor.map_or(true, |c| *item > c);
    set.iter()
        .filter(after_cursor)
        .chain(set.iter().filter(move |item| !after_cursor(item)))
}

impl CollectorState {
    fn store(&mut self, pull_requests: Vec<PullRequest>) -> usize {
        let count = pull_requests.len();
        for pull_request in pull_requests {
            self.needing_update_ids.remove(&pull_request.id);
            self.needing_update_uris.remove(&PullRequestUri {
                owner_with_name: pull_request.repository.name_with_owner.clone(),
                number: pull_request.number,
            });
            self.pull_requests
                .insert(pull_request.id.clone(), PullRequestContainer::new(pull_request));
        }
        count
    }

    /// Up to `limit` pending ids, continuing after the previous batch.
    /// Returned sorted.
    fn next_id_batch(&mut self, limit: usize) -> Vec<String> {
        let mut ids: Vec<String> = rotated(&self.needing_update_ids, self.id_cursor.as_ref())
            .take(limit)
            .cloned()
            .collect();
        if let Some(last) = ids.last() {
            self.id_cursor = Some(last.clone());
        }
        ids.sort();
        ids
    }

    /// Picks the repository of the next pending uri after the previous batch
    /// and up to `limit` of its numbers, returned ascending.
    fn next_uri_batch(&mut self, limit: usize) -> Option<(String, Vec<u64>)> {
        let repository = rotated(&self.needing_update_uris, self.uri_cursor.as_ref())
            .next()?
            .owner_with_name
            .clone();
        let batch: Vec<PullRequestUri> =
            rotated(&self.needing_update_uris, self.uri_cursor.as_ref())
                .filter(|uri| uri.owner_with_name == repository)
                .take(limit)
                .cloned()
                .collect();
        self.uri_cursor = batch.last().cloned();

        let mut numbers: Vec<u64> = batch.iter().map(|uri| uri.number).collect();
        numbers.sort_unstable();
        Some((repository, numbers))
    }
}

/// Search text that re-fetches specific pull requests of one repository.
pub fn uri_update_query(owner_with_name: &str, numbers: &[u64]) -> String {
    let numbers: Vec<String> = numbers.iter().map(u64::to_string).collect();
    format!("repo:{} is:pr {}", owner_with_name, numbers.join(" "))
}

pub struct PullRequestCollector {
    source: Arc<dyn PullRequestSource>,
    queries: Vec<Box<dyn CollectQuery>>,
    update_query: Option<Box<dyn CollectQuery>>,
    config: CollectorConfig,
    state: RwLock<CollectorState>,
}

impl PullRequestCollector {
    pub fn new(
        source: Arc<dyn PullRequestSource>,
        queries: Vec<Box<dyn CollectQuery>>,
        update_query: Option<Box<dyn CollectQuery>>,
        config: CollectorConfig,
    ) -> CollectorResult<Self> {
        config
            .validate()
            .map_err(|message| CollectorError::InvalidConfig { message })?;

        Ok(Self {
            source,
            queries,
            update_query,
            config,
            state: RwLock::new(CollectorState::default()),
        })
    }

    /// Flags a pull request to be re-fetched by node id on the next cycle.
    pub async fn request_update_by_id(&self, id: impl Into<String>) {
        self.state.write().await.needing_update_ids.insert(id.into());
    }

    /// Flags a pull request to be re-fetched by `owner/name#number`.
    pub async fn request_update_by_uri(&self, uri: &str) -> CollectorResult<()> {
        let uri = PullRequestUri::parse(uri)?;
        self.state.write().await.needing_update_uris.insert(uri);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<PullRequestContainer> {
        self.state.read().await.pull_requests.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.pull_requests.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.pull_requests.is_empty()
    }

    /// All collected pull requests, ordered by uri.
    pub async fn snapshot(&self) -> Vec<PullRequestContainer> {
        let state = self.state.read().await;
        let mut containers: Vec<PullRequestContainer> =
            state.pull_requests.values().cloned().collect();
        containers.sort_by(|a, b| {
            (&a.pull_request.repository.name_with_owner, a.pull_request.number)
                .cmp(&(&b.pull_request.repository.name_with_owner, b.pull_request.number))
        });
        containers
    }

    pub async fn pending_ids(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .needing_update_ids
            .iter()
            .cloned()
            .collect()
    }

    pub async fn pending_uris(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .needing_update_uris
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    async fn store(&self, pull_requests: Vec<PullRequest>) -> usize {
        self.state.write().await.store(pull_requests)
    }

    async fn search_and_store(&self, query: &str, report: &mut CycleReport) {
        report.queries_run += 1;
        match self.source.search_pull_requests(query).await {
            Ok(pull_requests) => {
                report.pull_requests_stored += self.store(pull_requests).await;
            }
            Err(e) => {
                warn!("Query '{}' failed: {}", query, e);
                report.failures.push(format!("{query}: {e}"));
            }
        }
    }

    async fn collect_needing_update(&self, report: &mut CycleReport) {
        let limit = self.config.update_batch_size;
        let (ids, uri_batch) = {
            let mut state = self.state.write().await;
            let ids = state.next_id_batch(limit);
            (ids, state.next_uri_batch(limit))
        };

        if !ids.is_empty() {
            debug!("Refreshing {} pull requests by id", ids.len());
            match self.source.pull_requests_by_ids(&ids).await {
                Ok(pull_requests) => {
                    report.pull_requests_stored += self.store(pull_requests).await;
                }
                Err(e) => {
                    warn!("Refreshing pull requests by id failed: {}", e);
                    report.failures.push(format!("ids: {e}"));
                }
            }
        }

        if let Some((repository, numbers)) = uri_batch {
            debug!(
                "Refreshing {} pull requests of {} by uri",
                numbers.len(),
                repository
            );
            let query = uri_update_query(&repository, &numbers);
            self.search_and_store(&query, report).await;
        }
    }

    /// Runs a single collection cycle. Individual request failures are
    /// recorded in the report and do not abort the cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for query in &self.queries {
            let text = query.query();
            self.search_and_store(&text, &mut report).await;
        }

        if let Some(update_query) = &self.update_query {
            let text = update_query.query();
            self.search_and_store(&text, &mut report).await;
        }

        self.collect_needing_update(&mut report).await;

        report
    }

    async fn run_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            let report = self.run_cycle().await;
            let total = self.len().await;

            if report.is_clean() {
                info!(
                    "Cycle {}: {} queries, {} pull requests stored, {} tracked",
                    cycle, report.queries_run, report.pull_requests_stored, total
                );
            } else {
                warn!(
                    "Cycle {}: {} queries, {} pull requests stored, {} tracked, {} failures",
                    cycle,
                    report.queries_run,
                    report.pull_requests_stored,
                    total,
                    report.failures.len()
                );
            }

            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.wait_time) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if *stop.borrow() {
                break;
            }
        }

        info!("Collector stopped after {} cycles", cycle);
    }

    /// Starts collecting in a background task. At least one cycle runs even
    /// if the collector is stopped right away.
    pub fn spawn(self) -> CollectorHandle {
        let collector = Arc::new(self);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&collector).run_loop(stop_rx));

        CollectorHandle {
            collector,
            stop_tx,
            task,
        }
    }
}

pub struct CollectorHandle {
    collector: Arc<PullRequestCollector>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CollectorHandle {
    pub fn collector(&self) -> &Arc<PullRequestCollector> {
        &self.collector
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the loop to stop and waits for the running cycle to finish.
    pub async fn stop(self) -> CollectorResult<Arc<PullRequestCollector>> {
        // The receiver is gone only if the task already ended.
        let _ = self.stop_tx.send(true);

        self.task.await.map_err(|e| CollectorError::TaskFailed {
            message: e.to_string(),
        })?;

        Ok(self.collector)
    }
}

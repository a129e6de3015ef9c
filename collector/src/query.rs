//! Search queries the collector runs on every cycle.

use chrono::{DateTime, Duration, Utc};

/// Produces the GitHub search text for one collection pass.
///
/// The text is re-evaluated every cycle, so implementations may depend on
/// the current time.
pub trait CollectQuery: Send + Sync {
    fn query(&self) -> String;
}

/// Always yields the same search text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantCollectQuery {
    query: String,
}

impl ConstantCollectQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

impl CollectQuery for ConstantCollectQuery {
    fn query(&self) -> String {
        self.query.clone()
    }
}

/// Narrows a base query to pull requests updated within `window` of now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentlyUpdatedPullRequests {
    pub base_query: String,
    pub window: Duration,
}

impl RecentlyUpdatedPullRequests {
    pub fn new(base_query: impl Into<String>, window: Duration) -> Self {
        Self {
            base_query: base_query.into(),
            window,
        }
    }

    /// Query text as it would read at `now`. Sub-second precision is dropped
    /// and a window reaching past chrono's range is clamped to its bound.
    pub fn query_at(&self, now: DateTime<Utc>) -> String {
        let since = now.checked_sub_signed(self.window).unwrap_or(
            if self.window < Duration::zero() {
                DateTime::<Utc>::MAX_UTC
            } else {
                DateTime::<Utc>::MIN_UTC
            },
        );
        format!(
            "{} updated:>={}",
            self.base_query,
            since.format("%Y-%m-%dT%H:%M:%S")
        )
    }
}

impl CollectQuery for RecentlyUpdatedPullRequests {
    fn query(&self) -> String {
        self.query_at(Utc::now())
    }
}

pub fn const_queries_from_list<S: AsRef<str>>(query_texts: &[S]) -> Vec<ConstantCollectQuery> {
    query_texts
        .iter()
        .map(|q| ConstantCollectQuery::new(q.as_ref()))
        .collect()
}

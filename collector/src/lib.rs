pub mod collector;
pub mod config;
pub mod query;

pub use collector::{
    uri_update_query, CollectorConfig, CollectorError, CollectorHandle, CollectorResult,
    CycleReport, PullRequestCollector, PullRequestContainer,
};
pub use config::{ConfigError, ConfigResult, FileConfig, GithubSection, RecentQueryConfig};
pub use query::{
    const_queries_from_list, CollectQuery, ConstantCollectQuery, RecentlyUpdatedPullRequests,
};

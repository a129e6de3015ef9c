use clap::{Parser, Subcommand};
use collector::{
    const_queries_from_list, CollectQuery, CollectorConfig, ConstantCollectQuery, FileConfig,
    PullRequestCollector, PullRequestContainer,
};
use github::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "intm")]
#[command(about = "Collects GitHub pull requests matched by search queries")]
struct Cli {
    /// GitHub token used for the GraphQL API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,
    /// GraphQL endpoint (for GitHub Enterprise)
    #[arg(long)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep collecting pull requests until interrupted
    Collect {
        /// TOML file with queries and settings
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Search query to collect (repeatable)
        #[arg(short, long = "query")]
        queries: Vec<String>,
        /// Query run after the regular ones on every cycle
        #[arg(long)]
        update_query: Option<String>,
        /// Seconds to wait between cycles
        #[arg(long)]
        wait_seconds: Option<u64>,
        /// Pull request uri (owner/name#number) to refresh (repeatable)
        #[arg(long = "refresh")]
        refresh: Vec<String>,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Run one search and print the matching pull requests
    Search {
        /// GitHub search query
        query: String,
    },
    /// Verify the token against the GitHub API
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Collect {
            config,
            queries,
            update_query,
            wait_seconds,
            refresh,
            once,
        } => {
            let file_config = match config {
                Some(path) => FileConfig::load(&path)?,
                None => FileConfig::default(),
            };

            let mut github_config = file_config.github_config(GithubConfig::new(cli.token));
            if let Some(api_url) = cli.api_url {
                github_config = github_config.with_api_url(api_url);
            }

            let mut collector_config = file_config.collector_config(CollectorConfig::default());
            if let Some(seconds) = wait_seconds {
                collector_config = collector_config.with_wait_time(Duration::from_secs(seconds));
            }

            let mut collect_queries = file_config.collect_queries();
            collect_queries.extend(
                const_queries_from_list(queries.as_slice())
                    .into_iter()
                    .map(|q| Box::new(q) as Box<dyn CollectQuery>),
            );

            let update = match update_query {
                Some(q) => Some(Box::new(ConstantCollectQuery::new(q)) as Box<dyn CollectQuery>),
                None => file_config.update_collect_query(),
            };

            let client = GithubClient::new(github_config)?;
            let collector = PullRequestCollector::new(
                Arc::new(client),
                collect_queries,
                update,
                collector_config,
            )?;

            for uri in &refresh {
                collector.request_update_by_uri(uri).await?;
            }

            run_collect(collector, once).await?;
        }
        Commands::Search { query } => {
            let client = GithubClient::new(github_config(cli.token, cli.api_url))?;
            search(&client, &query).await?;
        }
        Commands::Health => {
            let client = GithubClient::new(github_config(cli.token, cli.api_url))?;
            health_check(&client).await?;
        }
    }

    Ok(())
}

fn github_config(token: String, api_url: Option<String>) -> GithubConfig {
    let config = GithubConfig::new(token);
    match api_url {
        Some(url) => config.with_api_url(url),
        None => config,
    }
}

fn print_snapshot(snapshot: &[PullRequestContainer]) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}

async fn run_collect(
    collector: PullRequestCollector,
    once: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if once {
        let report = collector.run_cycle().await;
        for failure in &report.failures {
            error!("{}", failure);
        }
        print_snapshot(&collector.snapshot().await)?;
        return Ok(());
    }

    let handle = collector.spawn();
    info!("Collector running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Stopping collector");

    let collector = handle.stop().await?;
    print_snapshot(&collector.snapshot().await)?;

    Ok(())
}

async fn search(client: &GithubClient, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let pull_requests = client.search_pull_requests(query).await?;

    if pull_requests.is_empty() {
        println!("No pull requests found.");
    } else {
        for pr in pull_requests {
            println!("  - {} [{:?}] {}", pr.uri(), pr.state, pr.title);
        }
    }

    Ok(())
}

async fn health_check(client: &GithubClient) -> Result<(), Box<dyn std::error::Error>> {
    println!("Performing health check...");

    match client.health_check().await {
        Ok(()) => {
            println!("✓ Health check passed. GitHub API is reachable and the token is valid.");
            info!("Health check successful");
        }
        Err(e) => {
            println!("✗ Health check failed: {}", e);
            error!("Health check failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

//! github-tracker - incremental GitHub pull request sync and monthly
//! contributor attribution.
//!
//! The sync engine mirrors an organization's pull requests, commits, reviews
//! and timelines into a local SQLite store; the aggregator derives per-login
//! commit, merge and review credit from that store without touching GitHub.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod rpc;
pub mod services;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use config::{Cli, Command, Config};
use db::RecordStore;
use error::AppError;
use services::aggregator::{Aggregator, AttributionFilter};
use services::github_client::GitHubClient;
use services::sync_engine::SyncEngine;

async fn open_store(config: &Config) -> Result<RecordStore, AppError> {
    let db_path = config.database_path()?;
    log::debug!("Using database {}", db_path.display());
    let pool = db::initialize(&db_path).await?;
    Ok(RecordStore::new(pool))
}

fn build_engine(config: &Config, store: RecordStore) -> Result<SyncEngine, AppError> {
    let client = GitHubClient::new(config.client_config()?)?;
    Ok(SyncEngine::new(store, Arc::new(client)))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute one CLI invocation. `shutdown` is cancelled on Ctrl-C.
pub async fn run(cli: Cli, shutdown: CancellationToken) -> Result<(), AppError> {
    let store = open_store(&cli.config).await?;

    match cli.command {
        Command::Update { org, repo } => {
            let engine = build_engine(&cli.config, store)?;
            let report = engine
                .synchronize(&org, repo.as_deref(), &shutdown)
                .await?;
            print_json(&report)
        }
        Command::Report {
            org,
            repo,
            user,
            pr,
            from,
            to,
        } => {
            let mut filter = AttributionFilter::new(org, from);
            filter.repository = repo;
            filter.user = user;
            filter.pull_request = pr;
            let records = Aggregator::new(store)
                .aggregate_range(&filter, from, to)
                .await?;
            print_json(&records)
        }
        Command::Userinfo {
            org,
            user,
            year,
            month,
        } => {
            let info =
                services::user_info::user_information(&store, &org, &user, year, month).await?;
            print_json(&info)
        }
        Command::Serve {
            listen,
            rpc_user,
            rpc_pass,
        } => {
            let engine = Arc::new(build_engine(&cli.config, store)?);
            let listener = tokio::net::TcpListener::bind(listen)
                .await
                .map_err(|e| AppError::network(format!("Failed to bind {}: {}", listen, e)))?;
            let state = rpc::RpcState::new(engine, shutdown);
            rpc::serve(listener, state, rpc::RpcCredentials::new(rpc_user, rpc_pass)).await
        }
    }
}

//! Process configuration.
//!
//! Every global flag can also come from the environment, so the binary runs
//! unchanged from a shell, a service unit or a container.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::db;
use crate::error::AppError;
use crate::models::MonthPeriod;
use crate::services::github_client::{
    GitHubClientConfig, DEFAULT_API_URL, DEFAULT_REQUESTS_PER_SECOND,
};

#[derive(Parser, Debug)]
#[command(
    name = "github-tracker",
    version,
    about = "Sync GitHub pull requests and report monthly contributor attribution",
    long_about = None,
)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// SQLite database file.
    #[arg(long, env = "GITHUB_TRACKER_DB", global = true)]
    pub db_path: Option<PathBuf>,

    /// GitHub personal access token.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    pub api_token: Option<String>,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Upper bound on GitHub requests per second.
    #[arg(long, env = "GITHUB_TRACKER_RPS", default_value_t = DEFAULT_REQUESTS_PER_SECOND, global = true)]
    pub requests_per_second: u32,

    /// HTTP request timeout.
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout_secs: u64,

    /// Log filter (`error`, `info`, `github_tracker=debug`, ...).
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch new and updated pull requests of an organization.
    Update {
        #[arg(long)]
        org: String,

        /// Only this repository (short name or owner/name).
        #[arg(long)]
        repo: Option<String>,
    },

    /// Print attribution records for a range of months.
    Report {
        #[arg(long, required = true, num_args = 1..)]
        org: Vec<String>,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        pr: Option<i64>,

        /// First month, `YYYY-MM`.
        #[arg(long)]
        from: MonthPeriod,

        /// Last month (inclusive), `YYYY-MM`.
        #[arg(long)]
        to: MonthPeriod,
    },

    /// Print one user's monthly report.
    Userinfo {
        #[arg(long)]
        org: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        year: i32,

        #[arg(long)]
        month: u32,
    },

    /// Serve the JSON-RPC endpoint.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        listen: SocketAddr,

        #[arg(long, env = "GITHUB_TRACKER_RPC_USER")]
        rpc_user: String,

        #[arg(long, env = "GITHUB_TRACKER_RPC_PASS", hide_env_values = true)]
        rpc_pass: String,
    },
}

impl Config {
    /// Configured database path, or the default under the user data dir.
    pub fn database_path(&self) -> Result<PathBuf, AppError> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| AppError::internal("Failed to get data directory"))?;
        Ok(db::get_db_path(&data_dir.join("github-tracker")))
    }

    /// GitHub client settings. Fails when no token is configured.
    pub fn client_config(&self) -> Result<GitHubClientConfig, AppError> {
        let token = self
            .api_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::invalid_input_field(
                    "a GitHub token is required (--api-token or GITHUB_TOKEN)",
                    "api_token",
                )
            })?;

        Ok(GitHubClientConfig {
            base_url: self.api_url.clone(),
            token,
            timeout_secs: self.timeout_secs,
            requests_per_second: self.requests_per_second,
        })
    }
}

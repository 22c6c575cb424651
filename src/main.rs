use clap::Parser;
use tokio_util::sync::CancellationToken;

use github_tracker::config::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --log-level already falls back to RUST_LOG
    env_logger::Builder::new()
        .parse_filters(&cli.config.log_level)
        .init();

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, stopping after the current repository");
            signal_token.cancel();
        }
    });

    if let Err(e) = github_tracker::run(cli, shutdown).await {
        log::error!("{}", e);
        if e.is_not_found() {
            eprintln!("{}: run `github-tracker update` first", e);
        } else if !e.is_cancelled() {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }
}

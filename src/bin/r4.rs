//! r4 - Radio4000 command-line client.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use clap::Parser;
use tokio_util::sync::CancellationToken;

use r4::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received SIGINT, cancelling downloads");
            eprintln!("\nInterrupted, stopping...");
            on_signal.cancel();
        }
    });

    if let Err(e) = cli::run(cli, cancel).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::FmtSubscriber;

use snapshot_cli::Config;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::parse();

    // Setup logging (stderr to keep stdout for the failure fallback)
    let level = if config.quiet {
        LevelFilter::OFF
    } else {
        LevelFilter::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    match snapshot_cli::run(&config, &mut std::io::stdout()).await {
        Ok(report) => Ok(ExitCode::from(report.exit_code())),
        Err(e) => {
            // Printed even with -q; nothing was harvested.
            eprintln!("Error: {}", snapshot_cli::describe_error(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}

mod bootstrap;
mod fortune;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use courier_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use courier_slack::history::HistoryPaginator;

#[derive(Debug, Parser)]
#[command(
    name = "courier",
    about = "Courier workspace chat bot",
    long_about = "Connect to the Slack real-time stream, dispatch chat commands, and backfill conversation transcripts.",
    after_help = "Examples:\n  courier run\n  courier --log-level debug run\n  courier history C024BE91L"
)]
struct Cli {
    #[arg(long, help = "Path to the courier.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Path to the file containing the bot API token")]
    token_file: Option<PathBuf>,
    #[arg(long, help = "Log verbosity: trace|debug|info|warn|error")]
    log_level: Option<String>,
    #[arg(long, help = "Log format: compact|pretty|json")]
    log_format: Option<String>,
    #[arg(long, help = "Write logs to this file instead of stderr")]
    log_output: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Connect to the real-time stream and dispatch commands until interrupted")]
    Run,
    #[command(about = "Fetch the complete history of a conversation and print one line per message")]
    History {
        #[arg(help = "Channel, group, or direct-message identifier")]
        conversation: String,
    },
}

fn init_logging(config: &AppConfig) -> Result<()> {
    use tracing::Level;
    use LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match &config.logging.output {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            let writer = std::sync::Mutex::new(file);
            let builder = tracing_subscriber::fmt()
                .with_target(false)
                .with_max_level(log_level)
                .with_ansi(false)
                .with_writer(writer);
            match config.logging.format {
                Compact => builder.compact().init(),
                Pretty => builder.pretty().init(),
                Json => builder.json().init(),
            }
        }
        None => {
            let builder = tracing_subscriber::fmt().with_target(false).with_max_level(log_level);
            match config.logging.format {
                Compact => builder.compact().init(),
                Pretty => builder.pretty().init(),
                Json => builder.json().init(),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        token_file: cli.token_file,
        log_level: cli.log_level,
        log_format: cli.log_format.as_deref().map(str::parse).transpose()?,
        log_output: cli.log_output,
    };
    let config = AppConfig::load(LoadOptions {
        config_path: cli.config,
        overrides,
        ..LoadOptions::default()
    })?;
    init_logging(&config)?;

    match cli.command {
        Command::Run => run(config).await,
        Command::History { conversation } => history(config, &conversation).await,
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let app = bootstrap::bootstrap(&config).await?;

    tokio::select! {
        result = app.runner.run() => {
            tracing::info!("session loop ended");
            result
        }
        _ = wait_for_shutdown() => {
            tracing::info!("interrupt received; stopping session loop");
            Ok(())
        }
    }
}

async fn history(config: AppConfig, conversation: &str) -> Result<()> {
    let app = bootstrap::bootstrap(&config).await?;

    let paginator = HistoryPaginator::new(Arc::new(app.client.clone()), app.directory.clone());
    for line in paginator.fetch_history(conversation).await {
        println!("{line}");
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

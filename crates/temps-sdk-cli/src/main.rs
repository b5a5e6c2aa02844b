//! Temps SDK CLI
//!
//! Smoke-test tool for the client SDK: sends test events to a project and
//! drains the offline delivery queue.

mod commands;

use clap::{Parser, Subcommand};
use commands::{ReplayCommand, SendTestCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "TEMPS_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "TEMPS_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a test exception and a test metric, then flush
    SendTest(SendTestCommand),
    /// Deliver events persisted in the offline store
    Replay(ReplayCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes over completely when set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "temps_sdk_cli={level},\
             temps_sdk={level},\
             temps_sdk_capture={level},\
             h2=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = cli.log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::SendTest(cmd) => cmd.execute(),
        Commands::Replay(cmd) => cmd.execute(),
    }
}

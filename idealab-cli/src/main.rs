//! IdeaLab CLI: batch research runs, single-domain research, the HTTP
//! server and cache maintenance.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// IdeaLab: market, competition and problem research for business ideas
#[derive(Parser, Debug)]
#[command(name = "idealab", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Workspace directory (its .idealab/config.toml is loaded)
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Override the primary model
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run all three research services and save the results as JSON files
    Batch {
        /// The business idea to research
        business_idea: String,
        /// Industry the idea belongs to
        industry: String,
        /// Product type (e.g. "Mobile App", "SaaS")
        product_type: String,
        /// Problem statement; "none" or omitted uses a generated one
        problem_statement: Option<String>,
        /// Output directory (default: ./data/<idea>_<timestamp>)
        output_dir: Option<PathBuf>,
    },
    /// Run one research service and print its result
    Research {
        #[arg(value_enum)]
        domain: DomainArg,
        #[arg(long)]
        idea: String,
        #[arg(long)]
        industry: String,
        #[arg(long)]
        product_type: String,
        #[arg(long)]
        problem: Option<String>,
    },
    /// Start the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Maintain the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DomainArg {
    Market,
    Competition,
    Problem,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum CacheAction {
    /// Delete expired entries
    Prune,
    /// Delete every entry
    Clear,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write a default .idealab/config.toml into the workspace
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr; RUST_LOG wins when set
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "idealab", "idealab")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "idealab.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.model).await
}

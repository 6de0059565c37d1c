//! CLI subcommand handlers.

use crate::{CacheAction, Commands, ConfigAction, DomainArg};
use idealab_core::batch;
use idealab_core::config::{ResearchConfig, load_config};
use idealab_core::{ResearchEngine, ResearchRequest, ResultCache, gateway};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    model: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(model) = model {
        config.primary.model = model;
    }
    info!(
        workspace = %workspace.display(),
        primary = %config.primary.model,
        "Configuration loaded"
    );

    match command {
        Commands::Batch {
            business_idea,
            industry,
            product_type,
            problem_statement,
            output_dir,
        } => {
            let mut request = ResearchRequest::new(business_idea, industry, product_type);
            request.problem_statement = problem_statement.filter(|p| !is_none_arg(p));
            handle_batch(config, request, output_dir).await
        }
        Commands::Research {
            domain,
            idea,
            industry,
            product_type,
            problem,
        } => {
            let mut request = ResearchRequest::new(idea, industry, product_type);
            request.problem_statement = problem;
            handle_research(config, domain, request).await
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            handle_serve(config).await
        }
        Commands::Cache { action } => handle_cache(&config, action),
        Commands::Config { action } => {
            handle_config(&config, action.unwrap_or(ConfigAction::Show), workspace)
        }
    }
}

fn is_none_arg(value: &str) -> bool {
    value.trim().is_empty() || value.trim().eq_ignore_ascii_case("none")
}

fn build_engine(config: ResearchConfig) -> anyhow::Result<Arc<ResearchEngine>> {
    Ok(Arc::new(ResearchEngine::from_config(config)?))
}

async fn handle_batch(
    config: ResearchConfig,
    request: ResearchRequest,
    output_dir: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    println!("\nRunning market research for: {}", request.business_idea);
    println!("  Industry:     {}", request.industry);
    println!("  Product type: {}", request.product_type);

    let engine = build_engine(config)?;
    let outcome = batch::save_research_data(engine, request, output_dir).await?;

    println!("\nResearch data saved to {}", outcome.output_dir.display());
    for file in &outcome.files {
        if let Some(name) = file.file_name() {
            println!("  - {}", name.to_string_lossy());
        }
    }
    if !outcome.failed_tasks.is_empty() {
        println!("\nFailed tasks: {}", outcome.failed_tasks.join(", "));
    }
    Ok(())
}

async fn handle_research(
    config: ResearchConfig,
    domain: DomainArg,
    request: ResearchRequest,
) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    let failed = match domain {
        DomainArg::Market => print_envelope(&engine.research_market_size(&request).await)?,
        DomainArg::Competition => print_envelope(&engine.analyze_competition(&request).await)?,
        DomainArg::Problem => print_envelope(&engine.validate_problem(&request).await)?,
    };
    if failed {
        anyhow::bail!("Research did not complete");
    }
    Ok(())
}

/// Print an envelope as JSON; returns whether it is an error envelope.
fn print_envelope<R: Serialize>(
    envelope: &idealab_core::ResearchEnvelope<R>,
) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(envelope.is_error())
}

async fn handle_serve(config: ResearchConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    let engine = build_engine(config)?;
    println!("Research API listening on http://{}", addr);
    gateway::serve(engine, addr).await?;
    Ok(())
}

fn handle_cache(config: &ResearchConfig, action: CacheAction) -> anyhow::Result<()> {
    let cache = ResultCache::from_config(&config.cache);
    let (removed, what) = match action {
        CacheAction::Prune => (cache.prune()?, "expired"),
        CacheAction::Clear => (cache.clear()?, "cached"),
    };
    println!(
        "Removed {} {} entr{} from {}",
        removed,
        what,
        if removed == 1 { "y" } else { "ies" },
        cache.dir().display()
    );
    Ok(())
}

fn handle_config(
    config: &ResearchConfig,
    action: ConfigAction,
    workspace: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
        ConfigAction::Init => {
            let config_dir = workspace.join(".idealab");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&ResearchConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
    }
}

//! capsynth - capability synthesis CLI
//!
//! ## Commands
//!
//! - `run`: synthesize, validate and test a capability for a request
//! - `assess`: report whether existing actions cover a request
//! - `list`: show built-in actions and registered modules
//! - `invoke`: call an operation on a registered module
//! - `cleanup`: remove modules older than a cutoff

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, Level};

use capsynth_core::{
    write_trajectory_artifact, CapabilityRegistry, CapabilityRequest, CapabilityRuntime,
    CapsynthConfig, CodeGenService, GapAssessor, HttpCodeGenClient, Orchestrator, ProgressUpdate,
    TrajectoryArtifact,
};

#[derive(Parser)]
#[command(name = "capsynth")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Self-improving capability synthesis", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "CAPSYNTH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a capability for a request, retrying until it passes its tests
    Run {
        /// Natural-language request
        request: String,

        /// Built-in action available to serve the request (repeatable)
        #[arg(short, long = "action")]
        actions: Vec<String>,

        /// Override the configured iteration cap
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Write the run trajectory under this directory
        #[arg(long)]
        trajectory_out: Option<PathBuf>,
    },

    /// Assess whether existing actions can handle a request
    Assess {
        /// Natural-language request
        request: String,

        /// Built-in action available to serve the request (repeatable)
        #[arg(short, long = "action")]
        actions: Vec<String>,
    },

    /// List built-in actions and registered modules
    List,

    /// Invoke an operation on a registered module
    Invoke {
        /// Module name
        module: String,

        /// Operation name
        operation: String,

        /// Arguments; each is parsed as JSON, falling back to a plain string
        args: Vec<String>,
    },

    /// Remove registered modules older than the cutoff
    Cleanup {
        /// Age cutoff in days (default: from config)
        #[arg(long)]
        max_age_days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    capsynth_core::telemetry::init_tracing(cli.json, level);

    let config = CapsynthConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Run {
            request,
            actions,
            max_iterations,
            trajectory_out,
        } => {
            cmd_run(
                config,
                &request,
                &actions,
                max_iterations,
                trajectory_out.as_deref(),
            )
            .await
        }
        Commands::Assess { request, actions } => cmd_assess(&config, &request, &actions).await,
        Commands::List => cmd_list(&config),
        Commands::Invoke {
            module,
            operation,
            args,
        } => cmd_invoke(&config, &module, &operation, &args),
        Commands::Cleanup { max_age_days } => cmd_cleanup(&config, max_age_days),
    }
}

fn service(config: &CapsynthConfig) -> Result<Arc<dyn CodeGenService>> {
    let client = HttpCodeGenClient::new(config.service.clone()).context(format!(
        "Failed to create code-generation client (is {} set?)",
        config.service.api_key_env
    ))?;
    Ok(Arc::new(client))
}

/// Registry with every persisted module reloaded.
fn open_registry(config: &CapsynthConfig) -> Result<CapabilityRegistry> {
    let runtime = CapabilityRuntime::new(&config.runtime.workspace_dir, &config.runtime.limits);
    let mut registry = config.registry();
    let recovered = registry
        .recover(&runtime)
        .context("Failed to recover registered capabilities")?;
    info!(count = recovered.len(), "recovered capabilities");
    Ok(registry)
}

async fn cmd_run(
    mut config: CapsynthConfig,
    request: &str,
    actions: &[String],
    max_iterations: Option<u32>,
    trajectory_out: Option<&Path>,
) -> Result<()> {
    if let Some(n) = max_iterations {
        config.orchestrator.max_iterations = n;
        config.validate()?;
    }

    let mut registry = open_registry(&config)?;
    let mut orchestrator = Orchestrator::from_config(service(&config)?, &config);

    let sink = |update: ProgressUpdate| match update.iteration {
        Some(i) => println!("[{}/{}] {}", i, update.max_iterations, update.message),
        None => println!("{}", update.message),
    };
    let result = orchestrator
        .run(&mut registry, request, actions, Some(&sink))
        .await;

    println!();
    println!("Run:        {}", result.run_id);
    println!("Success:    {}", result.success);
    println!("Iterations: {}", result.iterations_used);
    println!("{}", result.trajectory_summary);
    if let Some(module) = result.final_result.as_ref().and_then(|o| o.module_name.as_ref()) {
        if result.success {
            println!("Module:     {}", module);
        }
    }

    if let Some(dir) = trajectory_out {
        let artifact = TrajectoryArtifact::from_result(&result, request)?;
        let path = write_trajectory_artifact(&artifact, dir)
            .context(format!("Failed to write trajectory under {:?}", dir))?;
        println!("Trajectory: {}", path.display());
    }

    if !result.success {
        bail!(
            "no working capability after {} iteration(s): {}",
            result.iterations_used,
            result.last_error().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn cmd_assess(config: &CapsynthConfig, request: &str, actions: &[String]) -> Result<()> {
    let registry = open_registry(config)?;
    let mut assessor = GapAssessor::new(service(config)?);
    let request = CapabilityRequest::new(request, actions.iter().cloned());

    let verdict = assessor
        .assess(&request, &registry.module_names(), None)
        .await;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn cmd_list(config: &CapsynthConfig) -> Result<()> {
    let registry = open_registry(config)?;
    let listing = registry.list_capabilities();

    println!("Built-in actions:");
    for action in &listing.built_in {
        println!("  {}", action);
    }

    if listing.generated.is_empty() {
        println!("No generated capabilities in {:?}", registry.dir());
        return Ok(());
    }

    println!("Generated capabilities:");
    for (name, module) in &listing.generated {
        println!(
            "  {}  (created {}, digest {})",
            name,
            module.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            &module.source_digest[..12.min(module.source_digest.len())]
        );
        for op in &module.operations {
            println!("    - {}", op);
        }
    }
    Ok(())
}

fn cmd_invoke(config: &CapsynthConfig, module: &str, operation: &str, args: &[String]) -> Result<()> {
    let mut registry = open_registry(config)?;
    let args: Vec<Value> = args
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
        .collect();

    let output = registry.use_capability(module, operation, &args)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cmd_cleanup(config: &CapsynthConfig, max_age_days: Option<i64>) -> Result<()> {
    let days = max_age_days.unwrap_or(config.registry.cleanup_max_age_days);
    if days <= 0 {
        bail!("--max-age-days must be > 0");
    }

    let mut registry = open_registry(config)?;
    let removed = registry.cleanup(chrono::Duration::days(days));

    if removed.is_empty() {
        println!("Nothing older than {} day(s)", days);
    } else {
        for name in &removed {
            println!("Removed {}", name);
        }
    }
    Ok(())
}

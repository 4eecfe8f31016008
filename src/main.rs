//! nlsgen CLI - Training data generation for non-linear system surrogates.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use nlsgen::{ComponentRegistry, Config, GenerationPipeline, GenerationReport};
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "nlsgen")]
#[command(version)]
#[command(about = "Training data generation for surrogates of non-linear equation systems")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "nlsgen.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate datasets for the configured equations
    Generate {
        /// Only generate for these equation ids
        #[arg(short, long = "equation")]
        equations: Vec<u64>,

        /// Override the number of new data points
        #[arg(short, long)]
        n: Option<usize>,

        /// Append to existing datasets
        #[arg(long)]
        append: bool,

        /// Override the run seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn print_example_config() {
    let example = r#"# nlsgen configuration file

[generation]
# "random" or { kind = "random_walk", delta = 0.05, step = "uniform" | "gaussian" }
method = { kind = "random_walk", delta = 0.05 }
n = 1000
n_batches = 8
n_threads = 4
append = false
clean = true
max_retries = 3
# seed = 42

[component]
model = "simple_loop"

[output]
dir = "data"
# work_dir = "data/shards"
progress = true

# Equations given inline...
[[equations]]
id = 14
inputs = [
    { name = "s", min = 0.0, max = 0.95 },
    { name = "r", min = 1.5, max = 3.15 },
]
outputs = ["y"]
# file = "simpleLoop_eq14.csv"

# ...and/or read from a profiling artifact
# profiling = "simpleLoop.profilingInfo.json"
"#;
    println!("{example}");
}

fn print_report(report: &GenerationReport) {
    println!("\n=== Equation {} ===", report.equation_id);
    println!("Requested:   {}", report.requested);
    println!("Accepted:    {}", report.accepted);
    println!("Failed:      {}", report.failed);
    println!("Non-conv.:   {}", report.non_convergent);
    println!("Attempts:    {}", report.attempts);
    println!("Acceptance:  {:.1}%", report.acceptance_rate * 100.0);
    println!("Rows:        {} ({} before)", report.total_rows, report.prior_rows);
    println!("Throughput:  {:.0}/hr", report.throughput_per_hour);
    println!("Runtime:     {:.1}s", report.runtime_secs);
    if !report.failed_batches.is_empty() {
        println!("Re-run:      batches {:?}", report.failed_batches);
    }
    println!("Output:      {:?}", report.dataset);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            let equations = config.validate().context("Invalid configuration")?;
            let registry = ComponentRegistry::new();
            registry
                .resolve(&config.component.model)
                .with_context(|| format!("Available: {}", registry.names().join(", ")))?;

            info!("Configuration is valid");
            info!(
                "  Method: {} ({} samples in {} batches, {} threads)",
                config.generation.method.name(),
                config.generation.n,
                config.generation.n_batches,
                config.generation.effective_threads()
            );
            info!("  Component: {}", config.component.model);
            for equation in &equations {
                info!(
                    "  Equation {}: {} inputs, {} outputs → {:?}",
                    equation.id,
                    equation.inputs.len(),
                    equation.outputs.len(),
                    config.output.dataset_path(equation)
                );
            }
        }

        Commands::Generate {
            equations,
            n,
            append,
            seed,
        } => {
            let mut config = load_config(&cli.config)?;

            // CLI overrides
            if let Some(n) = n {
                config.generation.n = n;
            }
            if append {
                config.generation.append = true;
            }
            if seed.is_some() {
                config.generation.seed = seed;
            }

            let mut selected = config.validate().context("Invalid configuration")?;
            if !equations.is_empty() {
                selected.retain(|eq| equations.contains(&eq.id));
                if selected.is_empty() {
                    bail!("None of the equations {equations:?} is configured");
                }
            }

            let registry = ComponentRegistry::new();
            let pipeline = GenerationPipeline::from_config(&config, &registry)?;
            let reports = pipeline.run_all(&selected).await?;

            for report in &reports {
                print_report(report);
            }
        }
    }

    Ok(())
}

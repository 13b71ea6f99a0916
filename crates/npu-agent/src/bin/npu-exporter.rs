//! Main binary for the NPU telemetry exporter

use clap::{Parser, Subcommand};
use npu_adapter::Backend;
use npu_agent::{init_agent, init_logging, probe, AgentConfig, AgentError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "npu-exporter")]
#[command(about = "Prometheus exporter for Ascend NPU telemetry")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Collection period in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    interval_ms: Option<u64>,

    /// Scrape endpoint bind address
    #[arg(long, value_name = "ADDR", global = true)]
    bind: Option<SocketAddr>,

    /// Device query backend: dcmi (needs the `dcmi` build feature) or mock.
    /// Defaults to dcmi when built with that feature, mock otherwise
    #[arg(long, value_name = "BACKEND", global = true)]
    backend: Option<Backend>,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the exporter (default)
    Run,
    /// Generate default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration
    Validate {
        /// Configuration file to validate
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Discover devices and print one sample per device
    Probe,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Some(Commands::Run) | None => run_exporter(&cli).await,
        Some(Commands::Config { ref output }) => generate_config(output.clone()),
        Some(Commands::Validate { ref file }) => validate_config(file.clone()),
        Some(Commands::Probe) => probe_devices(&cli).await,
    };

    if let Err(e) = outcome {
        let stage = if e.is_startup_failure() { "failed to start" } else { "failed" };
        if tracing::dispatcher::has_been_set() {
            error!("NPU exporter {}: {}", stage, e);
        } else {
            eprintln!("npu-exporter {}: {}", stage, e);
        }
        std::process::exit(1);
    }
}

/// Load the configuration file, if any, and apply command line overrides
fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = match cli.config {
        Some(ref path) => AgentConfig::from_file(path)?,
        None => AgentConfig::default(),
    };

    if let Some(interval_ms) = cli.interval_ms {
        config.sampling.interval_ms = interval_ms;
    }
    if let Some(bind) = cli.bind {
        config.metrics.bind_addr = bind;
    }
    if let Some(backend) = cli.backend {
        config.adapter.backend = backend;
    }
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.logging.format = format.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run_exporter(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    let mut agent = init_agent(&config).await?;

    info!(
        "Collecting {} device(s) every {:?}",
        agent.catalog().labels()?.len(),
        config.sampling.interval()
    );

    agent.run().await
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = AgentConfig::default();

    if let Some(output_path) = output {
        config.to_file(&output_path)?;
        println!("Generated configuration file: {}", output_path.display());
    } else {
        println!("{}", config.to_yaml()?);
    }

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = AgentConfig::from_file(&config_path)?;
    config.validate()?;

    println!("Configuration is valid");
    println!("Backend: {}", config.adapter.backend);
    println!("Collection interval: {} ms", config.sampling.interval_ms);
    println!("Metrics: http://{}{}", config.metrics.bind_addr, config.metrics.path);
    println!("Log level: {} ({})", config.logging.level, config.logging.format);

    Ok(())
}

async fn probe_devices(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    init_logging(&config.logging)?;

    let adapter = config.adapter.clone();
    let report = tokio::task::spawn_blocking(move || probe::probe(&adapter))
        .await
        .map_err(|e| AgentError::Service(format!("Probe task failed: {}", e)))??;

    print!("{}", report);
    Ok(())
}

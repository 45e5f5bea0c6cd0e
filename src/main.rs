//! visionlab CLI
//!
//! Entry points for training an experiment from a composed configuration and
//! for serving the interactive inference demo.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use visionlab::config::ExperimentConfig;
use visionlab::demo::DemoConfig;
use visionlab::experiment::run_experiment;
use visionlab::utils::logging::{init_logging, LogConfig};

/// Supervised image-classification research template
#[derive(Parser, Debug)]
#[command(name = "visionlab")]
#[command(version)]
#[command(about = "Image classification research template built on Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train and evaluate a model from a configuration
    Train {
        /// Configuration files, later files layered over earlier ones
        #[arg(short, long, default_value = "configs/default.json")]
        config: Vec<PathBuf>,

        /// Dotted configuration overrides, e.g. `model.optimizer.lr=0.01`
        #[arg(short = 'o', long = "override", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },

    /// Serve the interactive inference demo
    Demo {
        /// Demo configuration file
        #[arg(short, long, default_value = "configs/demo.json")]
        config: PathBuf,

        /// Checkpoint path overriding the one in the configuration
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train { config, overrides } => cmd_train(&config, &overrides),
        Commands::Demo {
            config,
            checkpoint,
            host,
            port,
        } => cmd_demo(&config, checkpoint, host, port),
    }
}

fn cmd_train(paths: &[PathBuf], overrides: &[String]) -> Result<()> {
    println!("{}", "visionlab :: training".green().bold());

    info!("Composing configuration from {:?}", paths);
    let config = ExperimentConfig::load_layered(paths, overrides)?;

    let score = run_experiment(config)?;

    if let Some(score) = score {
        println!(
            "{} {:.4}",
            "Optimization metric score:".cyan().bold(),
            score
        );
    }
    println!("{}", "Done.".green().bold());

    Ok(())
}

fn cmd_demo(
    config_path: &PathBuf,
    checkpoint: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    println!("{}", "visionlab :: demo".green().bold());

    let mut config = DemoConfig::load(config_path)?;
    if let Some(checkpoint) = checkpoint {
        config.checkpoint = checkpoint;
    }
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    println!(
        "  {} http://{}:{}",
        "Serving on".cyan(),
        config.host,
        config.port
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(visionlab::demo::serve(config))
}

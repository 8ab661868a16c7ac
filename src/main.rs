//! logue-librarian - manage user units and programs on Korg logue devices
//!
//! Talks to an NTS-1 / NTS-1 mkII over MIDI system exclusive messages.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logue_librarian::cli::{self, Command};
use logue_librarian::config::LibrarianConfig;
use logue_librarian::device::DeviceFamily;
use logue_librarian::paths;

/// Librarian for Korg logue devices
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "LOGUE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// MIDI input port (substring match)
    #[arg(short, long, env = "LOGUE_INPUT_PORT")]
    input: Option<String>,

    /// MIDI output port (substring match)
    #[arg(short, long, env = "LOGUE_OUTPUT_PORT")]
    output: Option<String>,

    /// Device type to connect to
    #[arg(short = 't', long = "type", env = "LOGUE_DEVICE")]
    family: Option<DeviceFamily>,

    /// Reply timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Command-line values override the file
    fn apply(&self, config: &mut LibrarianConfig) {
        if let Some(input) = &self.input {
            config.midi.input_port = input.clone();
        }
        if let Some(output) = &self.output {
            config.midi.output_port = output.clone();
        }
        if let Some(family) = self.family {
            config.device.family = family;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.session.timeout_ms = timeout_ms;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    let config_path = paths::resolve_config_path(args.config.as_deref());
    debug!("Configuration file: {}", config_path.display());

    let mut config = LibrarianConfig::load_or_default(&config_path).await?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        "Target: {} via '{}' / '{}'",
        config.device.family, config.midi.input_port, config.midi.output_port
    );

    cli::run(args.command, &config, &config_path).await
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

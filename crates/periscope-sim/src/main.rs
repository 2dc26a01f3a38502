//! Periscope Simulator
//!
//! Dry-runs the Periscope core against an in-memory target process and offers
//! a couple of offline utilities. Logs go to stderr, results to stdout as JSON.

mod scenario;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use periscope_common::{init_logging, PeriscopeConfig, RawMatrix, ViewMatrix};
use periscope_core::validate_view_matrix;
use scenario::ScenarioOptions;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "periscope-sim")]
#[command(about = "Periscope simulator - drive the camera and write engine without a device")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging with file/line info
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full core against a simulated target
    Run {
        /// Scenario length in seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,

        /// Realtime (view) tick interval in milliseconds
        #[arg(long, default_value_t = 16)]
        realtime_ms: u64,

        /// Write tick interval in milliseconds
        #[arg(long, default_value_t = 100)]
        write_ms: u64,

        /// Override the camera settle delay in milliseconds
        #[arg(long)]
        settle_ms: Option<u64>,

        /// Seconds into the run at which the player starts aiming through the optic
        #[arg(long)]
        aim_at: Option<u64>,
    },

    /// Run the view matrix sanity checks on 16 row-major floats
    CheckMatrix {
        /// M11 M12 M13 M14 M21 ... M44
        #[arg(num_args = 16, allow_hyphen_values = true)]
        values: Vec<f32>,

        /// Apply the in-session origin check
        #[arg(long)]
        in_session: bool,
    },

    /// Print the default configuration as TOML
    DefaultConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PeriscopeConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PeriscopeConfig::default(),
    };

    let mut log_config = config.logging.clone();
    if args.verbose {
        log_config = log_config.verbose();
    }
    init_logging(&log_config).context("initializing logging")?;

    match args.command {
        Commands::Run {
            seconds,
            realtime_ms,
            write_ms,
            settle_ms,
            aim_at,
        } => {
            let options = ScenarioOptions {
                duration: std::time::Duration::from_secs(seconds),
                realtime_interval: std::time::Duration::from_millis(realtime_ms.max(1)),
                write_interval: std::time::Duration::from_millis(write_ms.max(1)),
                settle_delay_ms: settle_ms,
                aim_at: aim_at.map(std::time::Duration::from_secs),
            };
            let summary = scenario::run(config, options).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::CheckMatrix { values, in_session } => {
            let values: [f32; 16] = match values.try_into() {
                Ok(values) => values,
                Err(values) => bail!("expected 16 values, got {}", values.len()),
            };
            let raw = RawMatrix::from_slice(&values);
            let verdict = validate_view_matrix(&raw, in_session, config.camera.world_bound);
            let view = ViewMatrix::from_raw(&raw);
            let report = serde_json::json!({
                "valid": verdict.is_ok(),
                "rejection": verdict.err().map(|r| r.to_string()),
                "world_bound": config.camera.world_bound,
                "view": view,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::DefaultConfig => {
            print!("{}", PeriscopeConfig::default().to_toml()?);
        }
    }

    Ok(())
}

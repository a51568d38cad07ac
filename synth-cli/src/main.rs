//! Command-line driver for the autonomous code-synthesis loop: run one task,
//! run the infinite outer loop, inspect the last checkpoint, or trigger a
//! maintenance/curator pass by hand.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use poetiq_synth_core::runtime::Runtime;

mod commands;
mod config;
mod output;

use config::load_settings;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "poetiq-synth")]
#[command(about = "Driver for the Poetiq Synth autonomous code-synthesis loop")]
#[command(version)]
struct Cli {
    /// Settings file path (TOML, JSON, or YAML). Falls back to
    /// `POETIQ_SYNTH_CONFIG`, a default search path, then built-in defaults.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Enable debug-level tracing.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single task through the full worker/refiner pipeline.
    RunTask {
        /// Task text in the generator's shape: an optional `Category:`
        /// line, a free-form description, and an optional `Test cases:`
        /// section (`- solve(<input>) -> <expected>` per line).
        spec: String,
    },
    /// Run the infinite autonomous loop until the stop-signal file appears.
    Loop,
    /// Print the last checkpointed monitoring snapshot.
    Status,
    /// Run one maintenance-and-curate pass and print its report.
    Curate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::RunTask { spec } => {
            let runtime = Runtime::bootstrap(settings)?;
            let report = commands::run_task(&runtime, &spec).await?;
            cli.format.print(&report)
        }
        Commands::Loop => {
            let runtime = Runtime::bootstrap(settings)?;
            commands::run_loop(&runtime).await
        }
        Commands::Status => {
            let status = commands::read_status(std::path::Path::new(&settings.data_dir))?;
            cli.format.print(&status)
        }
        Commands::Curate => {
            let runtime = Runtime::bootstrap(settings)?;
            let report = commands::curate(&runtime)?;
            cli.format.print(&report)
        }
    }
}

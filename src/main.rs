// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "lumafx")]
#[command(about = "Real-time frame filters, effect files and recording")]
#[command(version)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in filters and their parameters
    Filters,

    /// Show the metadata of an effect file
    Inspect {
        /// Effect file (.fx.json)
        effect: PathBuf,
    },

    /// Filter a still image
    Apply {
        /// Input image
        #[arg(short, long)]
        input: PathBuf,

        /// Output image (.jpg or .png)
        #[arg(short, long)]
        output: PathBuf,

        /// Built-in filter, as Stage or Stage.param=value (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Effect file to apply before the built-in filters
        #[arg(short, long)]
        effect: Option<PathBuf>,

        /// Mirror the image horizontally first
        #[arg(short, long)]
        mirror: bool,

        /// Licence key
        #[arg(long, default_value = "demo")]
        api_key: String,
    },

    /// Record the test-pattern camera through the filter chain
    Record {
        /// Output file (default: ~/Videos/lumafx/VID_TIMESTAMP.y4m)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of frames to record
        #[arg(short = 'n', long, default_value = "90")]
        frames: u64,

        /// Frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Built-in filter, as Stage or Stage.param=value (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Effect file
        #[arg(short, long)]
        effect: Option<PathBuf>,

        /// Licence key
        #[arg(long, default_value = "demo")]
        api_key: String,
    },

    /// List and download filters from a catalogue directory
    Cloud {
        /// Directory holding catalog.json
        #[arg(short, long)]
        catalog: PathBuf,

        /// Filter id to download
        #[arg(short, long)]
        download: Option<String>,

        /// Licence key
        #[arg(long, default_value = "demo")]
        api_key: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence, e.g. RUST_LOG=lumafx=trace
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    match cli.command {
        Commands::Filters => cli::list_filters(),
        Commands::Inspect { effect } => cli::inspect_effect(&effect),
        Commands::Apply {
            input,
            output,
            filters,
            effect,
            mirror,
            api_key,
        } => cli::apply_to_image(cli::ApplyArgs {
            input,
            output,
            filters,
            effect,
            mirror,
            api_key,
        }),
        Commands::Record {
            output,
            frames,
            fps,
            filters,
            effect,
            api_key,
        } => cli::record(cli::RecordArgs {
            output,
            frames,
            fps,
            filters,
            effect,
            api_key,
        }),
        Commands::Cloud {
            catalog,
            download,
            api_key,
        } => cli::cloud(&catalog, download.as_deref(), &api_key),
    }
}

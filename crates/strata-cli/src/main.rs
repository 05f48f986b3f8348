//! Strata command-line driver
//!
//! Builds a loader world from a `world.toml` manifest and answers
//! resolution and reflection queries against it.

mod commands;
mod manifest;
mod output;
mod world;

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use output::{resolve_color_choice, StyledOutput};
use world::World;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Inspect type loading and reflection for a Strata world", long_about = None)]
#[command(version)]
struct Cli {
    /// World manifest describing loaders and types
    #[arg(short, long, global = true, default_value = "world.toml")]
    manifest: PathBuf,

    /// Runtime config file (overrides the manifest's [runtime] table)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// When to use colors: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a type and describe it
    Resolve {
        /// Fully qualified type name
        name: String,
        /// Loader to resolve from (defaults to the last declared)
        #[arg(short, long)]
        loader: Option<String>,
        /// Also link the type (loads its native libraries)
        #[arg(long)]
        link: bool,
    },

    /// List a type's members
    Members {
        /// Fully qualified type name
        name: String,
        /// Loader to resolve from
        #[arg(short, long)]
        loader: Option<String>,
        /// Only members the type declares itself, any visibility
        #[arg(long)]
        declared: bool,
    },

    /// List a type's annotations
    Annotations {
        /// Fully qualified type name
        name: String,
        /// Loader to resolve from
        #[arg(short, long)]
        loader: Option<String>,
        /// Only annotations the type declares itself
        #[arg(long)]
        declared: bool,
    },

    /// Resolve and link every type the manifest declares
    Check,
}

fn setup_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("STRATA_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));
    let world = World::open(&cli.manifest, cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Resolve { name, loader, link } => {
            commands::resolve::execute(&world, loader.as_deref(), &name, link, cli.json, &mut out)
        }
        Commands::Members {
            name,
            loader,
            declared,
        } => commands::members::execute(&world, loader.as_deref(), &name, declared, cli.json, &mut out),
        Commands::Annotations {
            name,
            loader,
            declared,
        } => commands::annotations::execute(
            &world,
            loader.as_deref(),
            &name,
            declared,
            cli.json,
            &mut out,
        ),
        Commands::Check => commands::check::execute(&world, cli.json, &mut out),
    };

    world.runtime.shutdown();
    result
}

//! CLI entry point for bnd-csharp.

use std::path::PathBuf;

use anyhow::Result;
use bnd_csharp::{RunOptions, Target};
use clap::{Args, Parser, Subcommand};

/// bnd-csharp: generate C# bindings and their C++ shims from parsed headers.
#[derive(Parser, Debug)]
#[command(name = "bnd-csharp", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Emit the extern "C" C++ shim.
    Shim(Common),
    /// Emit the C# class.
    Surface {
        #[command(flatten)]
        common: Common,

        /// DllImport library name (overrides config).
        #[arg(long)]
        native_lib: Option<String>,
    },
}

#[derive(Args, Debug)]
struct Common {
    /// Parsed header description (TOML).
    input: PathBuf,

    /// Output file path.
    #[arg(short, long)]
    output: PathBuf,

    /// Class hierarchy file; repeat to merge several.
    #[arg(long)]
    hierarchy: Vec<PathBuf>,

    /// Path to a bnd-csharp.toml configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bnd_csharp=info")),
        )
        .init();

    let cli = Cli::parse();
    let (target, common, native_lib) = match cli.command {
        Command::Shim(common) => (Target::Shim, common, None),
        Command::Surface { common, native_lib } => (Target::Surface, common, native_lib),
    };
    let opts = RunOptions {
        config: common.config,
        hierarchy: common.hierarchy,
        native_lib,
    };
    bnd_csharp::run(target, &common.input, &common.output, &opts)?;
    Ok(())
}

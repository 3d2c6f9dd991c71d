//! Upcast CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "upcast")]
#[command(about = "Dependency-ordered, validated source upgrades through an LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform every source file under the root
    Run {
        /// Copy the repository here and transform the copy
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ignore and do not update the result cache
        #[arg(long)]
        no_cache: bool,

        /// Process one file at a time
        #[arg(long)]
        sequential: bool,

        /// Process all files in a single level
        #[arg(long)]
        ignore_deps: bool,

        /// Transformer provider (openrouter, openai, echo)
        #[arg(long)]
        provider: Option<String>,

        /// Model name passed to the provider
        #[arg(long)]
        model: Option<String>,

        /// Command that must succeed on each candidate, e.g. "python -m py_compile"
        #[arg(long)]
        check_command: Option<String>,

        /// Write the full results as JSON
        #[arg(long)]
        json_report: Option<PathBuf>,
    },
    /// Show cache statistics
    Stats,
    /// Clear the cache
    Clear,
    /// Print dependency levels and cycles
    Graph,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("upcast={}", log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("Upcast v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Repository root: {}", cli.root.display());

    match cli.command {
        Commands::Run {
            output,
            no_cache,
            sequential,
            ignore_deps,
            provider,
            model,
            check_command,
            json_report,
        } => {
            let options = commands::RunOptions {
                output,
                no_cache,
                sequential,
                ignore_deps,
                provider,
                model,
                check_command,
                json_report,
            };
            commands::run(cli.root, options).await
        }
        Commands::Stats => commands::stats(cli.root),
        Commands::Clear => commands::clear(cli.root),
        Commands::Graph => commands::graph(cli.root),
        Commands::Version => {
            println!("Upcast v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

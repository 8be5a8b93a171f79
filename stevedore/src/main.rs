use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Stevedore - Container Registry Client
///
/// A CLI tool for resolving, probing and searching container registries
/// over the classic registry protocols.
#[derive(Parser, Debug)]
#[command(name = "stevedore")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to a YAML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the configured registries for repositories
    Search {
        /// Search term, optionally qualified with a registry host
        term: String,
        /// Hide the index column and collapse duplicates
        #[arg(long)]
        no_index: bool,
        /// Only show repositories with at least this many stars
        #[arg(short, long, default_value_t = 0)]
        stars: i32,
        /// Username for index authentication
        #[arg(short, long)]
        username: Option<String>,
        /// Password for index authentication
        #[arg(short, long, requires = "username")]
        password: Option<String>,
    },
    /// Resolve a repository name against the configuration
    Resolve {
        /// Repository name (e.g. ubuntu, localhost:5000/fooo/bar)
        name: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Probe a registry endpoint
    Ping {
        /// Registry host, index name, or repository name
        address: String,
    },
}

fn log_filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Search {
            ref term,
            no_index,
            stars,
            ref username,
            ref password,
        } => {
            commands::search::run(
                cli.config.as_deref(),
                term,
                no_index,
                stars,
                username.as_deref(),
                password.as_deref(),
            )
            .await
        }
        Commands::Resolve { ref name, json } => {
            commands::resolve::run(cli.config.as_deref(), name, json)
        }
        Commands::Ping { ref address } => commands::ping::run(cli.config.as_deref(), address).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dovetail_core::build_manager::{BuildManager, BuildManagerConfig};
use dovetail_core::DirectoryMode;
use tracing_subscriber::EnvFilter;

mod commands;

/// Dovetail - A dependency-aware task runner
#[derive(Parser)]
#[command(name = "dovetail")]
#[command(about = "Run tasks and their dependencies, each at most once")]
#[command(version)]
struct Cli {
    /// Build file (defaults to dovetail.yml, dovetail.yaml or dovetail.toml)
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tasks declared in the build file
    List,
    /// Show the order tasks would run in without running them
    Plan {
        /// Tasks to plan, in order
        #[arg(required = true)]
        tasks: Vec<String>,
    },
    /// Run tasks and their dependencies
    Run {
        /// Tasks to run, in order
        #[arg(required = true)]
        tasks: Vec<String>,
        /// Print the build result as JSON
        #[arg(long)]
        json: bool,
        /// Change the process working directory along with each task
        #[arg(long)]
        chdir: bool,
    },
    /// Show the task dependency graph
    Graph,
    /// Print the JSON schema of the build file
    Schema,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Schema = cli.command {
        return commands::schema::execute();
    }

    let directory_mode = match cli.command {
        Commands::Run { chdir: true, .. } => DirectoryMode::Process,
        _ => DirectoryMode::Context,
    };

    // Load the build file (CLI layer only handles presentation)
    let manager = BuildManager::new(BuildManagerConfig {
        build_file: cli.file,
        search_dir: std::env::current_dir()?,
        directory_mode,
    })
    .map_err(|e| anyhow::anyhow!("Failed to load build file: {}", e))?;

    match cli.command {
        Commands::List => commands::list::execute(&manager),
        Commands::Plan { tasks } => commands::plan::execute(&manager, &tasks),
        Commands::Run { tasks, json, .. } => commands::run::execute(&manager, &tasks, json),
        Commands::Graph => commands::graph::execute(&manager),
        Commands::Schema => commands::schema::execute(),
    }
}

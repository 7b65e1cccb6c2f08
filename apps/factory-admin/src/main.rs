use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use runtime::{AppConfig, CliArgs};
use std::path::{Path, PathBuf};

mod bootstrap;
mod commands;
mod regen;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// SaaS Factory admin - inspect and toggle modules, apply presets and migrations
#[derive(Parser)]
#[command(name = "factory-admin")]
#[command(about = "SaaS Factory admin - inspect and toggle modules, apply presets and migrations")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project to inspect or mutate (overrides config)
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and the module dependency graph
    Check,
    /// Inspect and change module state
    #[command(subcommand)]
    Modules(ModulesCmd),
    /// Print the client flag snapshot as JSON
    Snapshot,
    /// Inspect and apply presets
    #[command(subcommand)]
    Presets(PresetsCmd),
}

#[derive(Subcommand)]
pub(crate) enum ModulesCmd {
    /// List every module with its resolved state
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Enable a module and its missing dependencies
    Enable {
        key: String,
        /// JSON object merged into the module's stored config
        #[arg(long = "config", value_name = "JSON")]
        config_json: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Disable a module and every enabled module depending on it
    Disable {
        key: String,
        #[arg(short, long)]
        yes: bool,
    },
    /// Apply migrations for a module, or for all enabled modules
    Apply {
        key: Option<String>,
        /// Run each module's seed.sql after its migrations
        #[arg(long)]
        seed: bool,
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum PresetsCmd {
    /// List built-in presets
    List,
    /// Enable every module of a preset
    Apply {
        key: String,
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        project: cli.project.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, Path::new(&config.home_dir));
    tracing::debug!(home_dir = %config.home_dir, "factory-admin starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Check) {
        Commands::Check => commands::check(&config).await,
        Commands::Modules(cmd) => {
            let ctx = bootstrap::AdminContext::open(config).await?;
            commands::modules(&ctx, cmd).await
        }
        Commands::Snapshot => {
            let ctx = bootstrap::AdminContext::open(config).await?;
            commands::snapshot(&ctx).await
        }
        Commands::Presets(cmd) => {
            let ctx = bootstrap::AdminContext::open(config).await?;
            commands::presets(&ctx, cmd).await
        }
    }
}

//! skylift command-line interface.
//!
//! Exit code is non-zero only on configuration validation failure;
//! per-item deployment failures are reported through the progress output
//! and recorded as missing URLs.

use clap::{Parser, Subcommand};
use colored::Colorize;
use skylift::progress::ConsoleReporter;
use skylift::{DeployConfig, DeployError, Orchestrator, Provider};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "skylift")]
#[command(author, version, about = "Deploy exported functions as serverless HTTP endpoints", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy matching exports to every configured provider
    Deploy {
        /// Directory to scan for exported functions
        #[arg(default_value = ".")]
        dir: String,

        /// Regular expression selecting export names
        #[arg(default_value = "^endpoint")]
        pattern: String,

        /// Gate endpoints behind a generated shared-secret bearer token
        #[arg(long)]
        auth: bool,

        /// Configuration file path
        #[arg(short, long, default_value = skylift::init::CONFIG_FILE)]
        config: String,
    },

    /// Infer credentials and scaffold a configuration file
    Init {
        /// Directory the configuration file is created in
        #[arg(default_value = ".")]
        dir: String,
    },

    /// Remove authorization from an api's default route
    Detach {
        /// Routing resource id
        api_id: String,

        /// Region of the routing resource
        #[arg(long)]
        region: String,

        /// Configuration file path
        #[arg(short, long, default_value = skylift::init::CONFIG_FILE)]
        config: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("skylift=info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> skylift::Result<()> {
    match cli.command {
        Commands::Deploy {
            dir,
            pattern,
            auth,
            config,
        } => {
            let pattern = regex::Regex::new(&pattern)
                .map_err(|e| DeployError::Configuration(format!("invalid pattern: {e}")))?;
            let config = DeployConfig::load(&config)?;
            let deploys_to_google = config.enables(Provider::Google);

            let orchestrator = Orchestrator::from_config(&config, Arc::new(ConsoleReporter::new()))?;
            let outcome = orchestrator.run(&dir, &pattern, auth).await?;

            if let Some(bearer) = &outcome.shared_bearer {
                println!("Authorization: Bearer {}", bearer.bold());
            }
            if outcome.results.is_empty() {
                println!("No exports found matching {pattern}");
            } else if deploys_to_google {
                println!("Google takes another 1 - 2m for changes to take effect");
            }
            Ok(())
        }

        Commands::Init { dir } => {
            if skylift::init::init(&dir)? {
                println!("Created {}", skylift::init::CONFIG_FILE);
            } else {
                println!("{} exists already.", skylift::init::CONFIG_FILE);
            }
            Ok(())
        }

        Commands::Detach {
            api_id,
            region,
            config,
        } => {
            let config = DeployConfig::load(&config)?;
            let orchestrator = Orchestrator::from_config(&config, Arc::new(ConsoleReporter::new()))?;
            orchestrator.detach_default_route(&api_id, &region).await?;
            println!("Default route of {api_id} is now unauthorized.");
            Ok(())
        }
    }
}

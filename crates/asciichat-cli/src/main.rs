//! ASCII Chat CLI entry point

use std::path::Path;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use asciichat_cli::{app::ChatApp, cli::Cli, config::AppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", AppConfig::example_config());
        return Ok(());
    }

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    setup_logging(config.cli.verbose);

    if let Err(e) = ChatApp::new(config).run().await {
        error!("Chat failed: {}", e);
        std::process::exit(1);
    }

    info!("ASCII chat exited successfully");
    Ok(())
}

/// Setup logging; `RUST_LOG` overrides the verbosity flag
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Defaults, then the configuration file, then command line overrides
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref().map(Path::new))?;
    config.apply_cli(cli)?;
    Ok(config)
}

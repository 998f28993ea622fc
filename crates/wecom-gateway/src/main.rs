// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! wecom-gateway: receives WeCom callbacks and relays outbound messages.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod logging;
mod send;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// WeCom callback gateway and outbound relay.
#[derive(Parser, Debug)]
#[command(name = "wecom-gateway", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the callback endpoint and log inbound messages.
    Serve,
    /// Validate configuration and list accounts with their callback URLs.
    Check,
    /// Send one message and print a JSON result line.
    Send(send::SendArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => wecom_config::load_and_validate_path(path),
        None => wecom_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            wecom_config::render_diagnostics(&errors);
            std::process::exit(1);
        }
    };

    logging::init_tracing(
        &config.service.log_level,
        logging::secret_set(&config.wecom),
    );

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Check => check::run_check(&config),
        Commands::Send(args) => send::run_send(config, args).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

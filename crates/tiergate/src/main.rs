// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tiergate - complexity-tiered router for LLM backends.
//!
//! This is the binary entry point.

mod classify;
mod serve;
mod shutdown;

use std::path::PathBuf;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};
use tiergate_config::TiergateConfig;

/// Tiergate - complexity-tiered router for LLM backends.
#[derive(Parser, Debug)]
#[command(name = "tiergate", version, about, long_about = None)]
struct Cli {
    /// Load this file (plus TIERGATE_* overrides) instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway.
    Serve,
    /// Validate the configuration and print a summary.
    CheckConfig,
    /// Classify a saved request body and print the result.
    Classify {
        /// Path to a Messages API request JSON file.
        file: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> TiergateConfig {
    let loaded = match path {
        Some(path) => tiergate_config::load_and_validate_path(path),
        None => tiergate_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            tiergate_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::CheckConfig) => {
            println!("{}", serve::describe_config(&config));
            Ok(())
        }
        Some(Commands::Classify { file }) => classify::classify_file(&config, &file).map(|out| {
            println!("{out}");
        }),
        None => {
            println!("tiergate: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("tiergate: {e}");
        std::process::exit(1);
    }
}

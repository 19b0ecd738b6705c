// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lanes - a plugin host running serialized execution lanes.
//!
//! This is the binary entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lanes::{commands, shutdown};
use lanes_config::{ConfigError, LanesConfig};

/// Lanes - a plugin host running serialized execution lanes.
#[derive(Parser, Debug)]
#[command(name = "lanes", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Defaults to the standard lookup hierarchy.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start every configured channel and run until interrupted.
    Run,
    /// List discoverable plugin types.
    Plugins,
    /// Validate configuration and resolve every configured plugin type.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            lanes_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.runtime.log_level);
    lanes_channel::metrics::register_metrics();

    let code = match cli.command {
        Some(Commands::Run) => {
            let cancel = shutdown::install_signal_handler();
            match commands::run(&config, cancel).await {
                Ok(()) => 0,
                Err(err) => {
                    eprintln!("lanes: {err}");
                    1
                }
            }
        }
        Some(Commands::Plugins) => match commands::list_plugins(&config) {
            Ok(table) => {
                print!("{table}");
                0
            }
            Err(err) => {
                eprintln!("lanes: {err}");
                1
            }
        },
        Some(Commands::Check) => match commands::check(&config) {
            Ok(report) => {
                print!("{}", report.output);
                if report.is_ok() {
                    println!("configuration ok ({} channels)", config.channels.len());
                    0
                } else {
                    eprintln!("lanes: {} plugin type(s) not found", report.missing.len());
                    1
                }
            }
            Err(err) => {
                eprintln!("lanes: {err}");
                1
            }
        },
        None => {
            println!("lanes: use --help for available commands");
            0
        }
    };
    std::process::exit(code);
}

fn load_config(path: Option<&PathBuf>) -> Result<LanesConfig, Vec<ConfigError>> {
    match path {
        Some(path) => lanes_config::load_and_validate_path(path),
        None => lanes_config::load_and_validate(),
    }
}

/// Initializes the tracing subscriber.
///
/// `LANES_LOG` wins over `RUST_LOG`; without either, the configured level
/// applies to the Lanes crates and `warn` to everything else.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("LANES_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "warn,lanes={log_level},lanes_core={log_level},lanes_channel={log_level},\
                 lanes_plugin={log_level},lanes_config={log_level}"
            ))
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .init();
}

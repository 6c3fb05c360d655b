//! scanlink CLI - Serve a local scanner over HTTP
//!
//! A command-line tool for listing scanners, taking one-off scans,
//! and running the loopback scan endpoint.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scanlink_core::config::PORT_ENV;
use scanlink_core::DEFAULT_PORT;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scanlink")]
#[command(author, version, about = "Serve a local scanner over HTTP")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached scanners
    #[command(alias = "ls")]
    List,

    /// Scan one page to a file
    Scan {
        /// Identity of the scanner, as printed by `list`
        #[arg(short, long)]
        device: String,

        /// Write the bytes as the device produced them instead of a PDF
        #[arg(long)]
        raw: bool,

        /// Output file (default: scan-<timestamp>.pdf or .bin)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that a port is valid and free
    CheckPort {
        /// Port to check
        port: String,
    },

    /// Serve the selected scanner until interrupted
    Serve {
        /// Identity of the scanner, as printed by `list`
        #[arg(short, long)]
        device: String,

        /// Port to listen on
        #[arg(short, long, env = PORT_ENV, default_value = DEFAULT_PORT)]
        port: String,
    },

    /// Interactive console (default)
    Console,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List) => {
            commands::list::run(cli.json).await?;
        }
        Some(Commands::Scan {
            device,
            raw,
            output,
        }) => {
            commands::scan::run(device, raw, output, cli.json).await?;
        }
        Some(Commands::CheckPort { port }) => {
            commands::check_port::run(port, cli.json).await?;
        }
        Some(Commands::Serve { device, port }) => {
            commands::serve::run(device, port).await?;
        }
        Some(Commands::Console) | None => {
            commands::console::run(cli.json).await?;
        }
    }

    Ok(())
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "diffpack")]
#[command(version, about = "Deterministic Git diff ingestion for code analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a diff payload between two commits
    Run(RunArgs),

    /// Serve the pipeline over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics stay on stderr; stdout carries only the envelope.
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let code = commands::run::run(args)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Serve { host, port } => {
            commands::serve::run(host, port).await?;
        }
    }

    Ok(())
}

//! rpger — AI-assisted TTRPG PDF extraction
//!
//! Single binary carrying the CLI surface and the HTTP session surface
//! (`rpger serve`).

use clap::Parser;
use rpger_common::config::Config;
use rpger_ingest::cli::{self, Cli, Command};
use tracing_subscriber::EnvFilter;

fn main() {
    // RUST_LOG wins; default keeps the pipeline's info-level narration
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };

    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let outcome = runtime.block_on(async {
        match cli.command {
            Command::Extract { pdf, flags } => cli::cmd_extract(&config, &pdf, &flags).await,
            Command::Batch { dir, flags } => cli::cmd_batch(&config, &dir, &flags).await,
            Command::Status => cli::cmd_status(&config).await,
            Command::Serve { port } => cli::cmd_serve(&config, port).await,
        }
    });

    match outcome {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error ({}): {e}", e.code());
            std::process::exit(e.exit_code());
        }
    }
}

//! Gemini capsule server.
//!
//! Serves static files, directory listings, CGI programs and SCGI
//! applications over the Gemini protocol.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request     ┌──────────┐   ┌─────────┐   ┌──────────────────────────┐
//!     ──────────────────▶│   net    │──▶│protocol │──▶│ security + config cascade│
//!                        │listener  │   │ handler │   │ + routing (redirects)    │
//!                        │  + TLS   │   └─────────┘   └────────────┬─────────────┘
//!                        └──────────┘                              │
//!                                                    ┌─────────────┴────────────┐
//!                                                    ▼                          ▼
//!     Client Response                         ┌────────────┐            ┌────────────┐
//!     ◀───────────────────────────────────────│  gateway   │            │  content   │
//!                                             │ CGI / SCGI │            │file/listing│
//!                                             └────────────┘            └────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use gemini_capsule::config::{load_config, ServerConfig};
use gemini_capsule::lifecycle;
use gemini_capsule::observability::init_logging;

const DEFAULT_CONFIG_PATH: &str = "/etc/gemini-capsule.toml";

#[derive(Parser, Debug)]
#[command(name = "gemini-capsule", version, about = "Gemini capsule server")]
struct Cli {
    /// Configuration file [default: /etc/gemini-capsule.toml if it exists]
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => load_config(&path)?,
        None if PathBuf::from(DEFAULT_CONFIG_PATH).exists() => {
            load_config(&PathBuf::from(DEFAULT_CONFIG_PATH))?
        }
        None => ServerConfig::default(),
    };

    init_logging(&config)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        hostname = %config.hostname,
        port = config.port,
        doc_base = %config.doc_base.display(),
        "gemini-capsule starting"
    );

    lifecycle::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

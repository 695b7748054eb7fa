//! Helpdesk Server Binary
//!
//! Standalone server for the ticket document API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use helpdesk_core::HelpdeskConfig;
use helpdesk_server::{serve, AppState};

/// Ticket document API server
#[derive(Debug, Parser)]
#[command(name = "helpdesk-server", version, about)]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, env = "HELPDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(long)]
    listen: Option<String>,

    /// SQLite database file, overriding the configuration
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let mut config = HelpdeskConfig::resolve(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(database) = cli.database {
        config.server.database_path = database;
    }
    config.validate()?;

    let state = Arc::new(AppState::open(&config.server.database_path)?);
    serve(&config.server.listen_addr, state).await
}

//! Standalone sync server.

use std::path::PathBuf;

use clap::Parser;
use coedit_collab::{ServerConfig, SyncServer};

#[derive(Debug, Parser)]
#[command(name = "coedit-server", version, about = "Collaborative editing sync server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the configuration file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory `file://` documents are served from
    #[arg(long)]
    content_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> coedit_core::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(root) = args.content_root {
        config.content_root = Some(root);
    }

    log::info!("Starting coedit server on {}", config.bind_addr);
    if let Some(root) = &config.content_root {
        log::info!("Serving documents from {}", root.display());
    }

    SyncServer::new(config).run().await
}

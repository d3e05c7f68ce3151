mod ancestry;
mod authentication;
mod authorization;
mod config;
mod discovery;
mod error;
mod etag;
mod login;
mod metadata;
mod path;
mod resource;
mod scope;
mod server;
mod state;
mod storage;
mod tokens;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rs_http_parser::parser::DEFAULT_MAX_BODY_BYTES;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use ancestry::OwnershipPolicy;
use config::Config;
use server::Server;
use state::AppState;

/// Personal storage server speaking the remoteStorage protocol
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding one subdirectory per user
    #[arg(short, long, default_value = "storage")]
    storage: PathBuf,

    /// Port to listen on for HTTP requests
    #[arg(short, long, default_value = "8888")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// External URL used in discovery documents, e.g. https://example.com
    #[arg(long)]
    base_url: Option<String>,

    /// Owner of stored files: `disabled`, `authenticated` or `<uid>:<gid>`
    #[arg(long, default_value = "disabled")]
    ownership: OwnershipPolicy,

    /// Directory served under /css/
    #[arg(long, default_value = "css")]
    assets: PathBuf,

    /// Largest accepted request body in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_size: usize,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level: tracing::Level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stdout_layer).init();

    let config = Config {
        storage_root: args.storage,
        listen_addr: SocketAddr::new(args.bind, args.port),
        base_url: args.base_url,
        ownership: args.ownership,
        assets_dir: args.assets,
        max_body_bytes: args.max_body_size,
    };

    tracing::info!(
        "Serving {} (ownership: {})",
        config.storage_root.display(),
        config.ownership
    );

    let server = Server::new(AppState::new(config)).await?;

    tokio::select! {
        _ = server.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}

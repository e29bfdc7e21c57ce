//! pdftk MCP Server - Entry point
//!
//! Exposes pdftk operations as MCP tools over stdio.

use pdftk_mcp_server::{run_server_with_config, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdftk_mcp_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        resource_dirs = ?config.resource_dirs,
        cache_max_entries = config.cache_max_entries,
        "Starting pdftk MCP Server"
    );

    run_server_with_config(config).await
}

//! Develop command.

use anyhow::Result;
use sitewright_static::{SiteConfig, SitePipeline};

/// Compile, then watch and serve. `port` and `open` override the config.
pub async fn run(mut config: SiteConfig, port: Option<u16>, open: bool) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    config.server.open |= open;

    tracing::info!("Starting development server on port {}", config.server.port);

    sitewright_server::develop(SitePipeline::new(config)?).await?;

    Ok(())
}

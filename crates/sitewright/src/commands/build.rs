//! Build command.

use anyhow::Result;
use sitewright_static::{SiteConfig, SitePipeline};

use super::{ensure_success, report};

/// Run the full build. Fails when any task failed.
pub async fn run(config: SiteConfig) -> Result<()> {
    tracing::info!("Building {} -> {}", config.src.display(), config.dist.display());

    let run = SitePipeline::new(config)?.build().await?;
    report(&run);
    ensure_success(&run)
}

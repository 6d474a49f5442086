//! Clean command.

use anyhow::Result;
use sitewright_static::{SiteConfig, SitePipeline};

use super::{ensure_success, report};

/// Delete dist and temp.
pub async fn run(config: SiteConfig) -> Result<()> {
    let run = SitePipeline::new(config)?.clean().await?;
    report(&run);
    ensure_success(&run)
}

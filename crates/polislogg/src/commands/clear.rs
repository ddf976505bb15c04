//! `polislogg clear`

use anyhow::{Context as _, Result};
use polislogg_core::sync::LAST_SYNC_KEY;

use super::Context;

/// Wipe the local cache. The watermark goes too, so the next pull is a full one.
pub async fn run(ctx: &Context) -> Result<()> {
    ctx.store
        .write()
        .await
        .clear_cache()
        .context("Failed to clear local cache")?;
    ctx.backend
        .remove(LAST_SYNC_KEY)
        .context("Failed to clear sync watermark")?;
    println!("Local cache cleared");
    Ok(())
}

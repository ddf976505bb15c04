//! `polislogg fetch`

use std::sync::Arc;

use anyhow::Result;

use polislogg_core::UpstreamPoller;

use super::Context;

pub async fn run(ctx: &Context) -> Result<()> {
    let poller = UpstreamPoller::new(
        Arc::new(ctx.police_client()?),
        ctx.store.clone(),
        ctx.config.filters.clone(),
        ctx.config.poll_interval(),
    );
    let received = poller.poll_once().await?;

    let store = ctx.store.read().await;
    println!(
        "Fetched {} current events; cache holds {} ({} archived)",
        received,
        store.len(),
        store.archived_events(None).len()
    );
    Ok(())
}

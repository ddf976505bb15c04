//! `polislogg run` - the long-running client

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use polislogg_core::UpstreamPoller;

use super::Context;

pub async fn run(ctx: Context) -> Result<()> {
    let cached = ctx.store.read().await.len();
    info!(
        cached,
        shared_cache = %ctx.config.shared_cache_url,
        feed = %ctx.config.api_url,
        "polislogg starting"
    );

    let poller = Arc::new(UpstreamPoller::new(
        Arc::new(ctx.police_client()?),
        ctx.store.clone(),
        ctx.config.filters.clone(),
        ctx.config.poll_interval(),
    ));
    let sync = Arc::new(ctx.synchronizer()?);

    let handle = poller.spawn().merge(sync.spawn());

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, finishing in-flight work");
    handle.shutdown().await;

    info!(cached = ctx.store.read().await.len(), "polislogg stopped");
    Ok(())
}

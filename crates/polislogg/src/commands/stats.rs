//! `polislogg stats`

use anyhow::Result;
use chrono::Utc;

use crate::render;

use super::Context;

pub async fn run(ctx: &Context, shared: bool) -> Result<()> {
    let now = Utc::now();
    {
        let store = ctx.store.read().await;
        let archived = store.archived_events(None).len();
        println!(
            "{}",
            render::local_stats(store.cache_metadata(), store.len(), archived, now)
        );
        if let Some(bounds) = store.date_range() {
            println!("  Days:        {} to {}", bounds.earliest, bounds.latest);
        }
    }

    if shared {
        let metadata = ctx.synchronizer()?.shared_stats().await?;
        println!();
        println!("{}", render::shared_stats(&metadata, now));
    }
    Ok(())
}

//! `polislogg events` and `polislogg show`

use anyhow::Result;
use chrono::Utc;

use crate::render;

use super::{Context, EventsQuery};

pub async fn list(ctx: &Context, query: &EventsQuery) -> Result<()> {
    let store = ctx.store.read().await;
    let events = query.select(&store);
    if events.is_empty() {
        println!("No cached events match.");
        return Ok(());
    }
    for cached in &events {
        println!("{}", render::event_line(cached));
    }
    Ok(())
}

pub async fn show(ctx: &Context, id: i64) -> Result<()> {
    let store = ctx.store.read().await;
    let cached = store
        .event_by_id(id)
        .ok_or_else(|| anyhow::anyhow!("Event {} is not in the local cache", id))?;
    println!("{}", render::event_detail(cached, Utc::now()));
    Ok(())
}

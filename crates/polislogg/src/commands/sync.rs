//! `polislogg pull`, `push` and `reset-shared`

use anyhow::Result;

use crate::render;

use super::Context;

pub async fn pull(ctx: &Context, force: bool) -> Result<()> {
    let sync = ctx.synchronizer()?;
    let outcome = if force {
        sync.force_pull().await?
    } else {
        sync.pull().await?
    };
    println!("{}", render::pull_outcome(&outcome));
    Ok(())
}

pub async fn push(ctx: &Context) -> Result<()> {
    let outcome = ctx.synchronizer()?.push().await?;
    println!("{}", render::push_outcome(&outcome));
    Ok(())
}

pub async fn reset_shared(ctx: &Context) -> Result<()> {
    let response = ctx.synchronizer()?.reset_shared().await?;
    println!("{}", response.message);
    Ok(())
}

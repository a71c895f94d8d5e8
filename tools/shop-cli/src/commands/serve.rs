//! Long-running sweeper process.

use anyhow::{anyhow, Context as _, Result};
use tokio_util::sync::CancellationToken;

use super::ServeArgs;
use crate::context::Context;

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let logging = &ctx.config.logging;
    turbo_shop::telemetry::init(&logging.level, logging.format)
        .map_err(|e| anyhow!("Failed to initialise logging: {e}"))?;
    ctx.config.ensure_valid().context("Invalid configuration")?;

    let path = ctx.store_path(args.db.as_deref());
    let db = ctx.open_store(path.as_deref())?;
    let shop = ctx.shop(db)?;

    let shutdown = CancellationToken::new();
    let sweeper = shop.sweeper.spawn(shutdown.clone());
    ctx.output.success(&format!(
        "Sweeping every {}s (reservation TTL {}s). Press Ctrl-C to stop.",
        ctx.config.reservation.sweep_interval_secs, ctx.config.reservation.ttl_secs
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    ctx.output.info("Shutting down");
    shutdown.cancel();
    sweeper.await.context("Sweeper task failed")?;
    ctx.output.success("Stopped");
    Ok(())
}

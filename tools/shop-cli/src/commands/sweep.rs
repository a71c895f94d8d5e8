//! One-off sweep of expired reservations.

use anyhow::Result;

use super::SweepArgs;
use crate::context::Context;

/// Run the sweep command.
pub async fn run(args: SweepArgs, ctx: &Context) -> Result<()> {
    let path = ctx.store_path(args.db.as_deref());
    let db = ctx.open_store(path.as_deref())?;
    let shop = ctx.shop(db)?;

    if args.dry_run {
        let report = shop.audit().await?;
        let units = report.sweepable_units();
        if ctx.output.is_json() {
            ctx.output.json(&serde_json::json!({ "sweepable_units": units }));
        } else {
            ctx.output.info(&format!("{units} unit(s) held past the TTL"));
        }
        return Ok(());
    }

    let report = shop.sweeper.run_once().await?;

    if ctx.output.is_json() {
        ctx.output.json(&report);
        return Ok(());
    }

    ctx.output.header("Sweep");
    ctx.output.kv("carts scanned", &report.carts_scanned.to_string());
    ctx.output.kv("carts swept", &report.carts_swept.to_string());
    ctx.output.kv("lines released", &report.lines_released.to_string());
    ctx.output.kv("units released", &report.units_released.to_string());
    if report.carts_failed > 0 {
        ctx.output.warn(&format!(
            "{} cart(s) could not be swept and will be retried",
            report.carts_failed
        ));
    } else {
        ctx.output.success("Done");
    }
    Ok(())
}

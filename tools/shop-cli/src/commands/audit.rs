//! Ledger audit and stock report.

use anyhow::{bail, Result};
use turbo_shop::audit::Violation;

use super::AuditArgs;
use crate::context::Context;
use crate::output::availability_badge;

/// Run the audit command.
pub async fn run(args: AuditArgs, ctx: &Context) -> Result<()> {
    let path = ctx.store_path(args.db.as_deref());
    let db = ctx.open_store(path.as_deref())?;
    let shop = ctx.shop(db)?;
    let report = shop.audit().await?;

    if ctx.output.is_json() {
        ctx.output.json(&report);
    } else {
        ctx.output.header("Stock");
        let widths = [16, 6, 6, 9, 10, 8];
        ctx.output.table_row(
            &["PRODUCT", "SIZE", "STOCK", "RESERVED", "AVAILABLE", "EXPIRED"],
            &widths,
        );
        for v in report
            .variants
            .iter()
            .filter(|v| !args.held_only || v.reserved != 0 || v.held_in_carts != 0)
        {
            ctx.output.table_row(
                &[
                    v.product_id.as_str(),
                    &v.size,
                    &v.stock.to_string(),
                    &v.reserved.to_string(),
                    &availability_badge(v.available(), v.stock),
                    &v.held_expired.to_string(),
                ],
                &widths,
            );
        }

        for violation in &report.violations {
            ctx.output.error(&describe(violation));
        }
        if report.sweepable_units() > 0 {
            ctx.output.info(&format!(
                "{} unit(s) are held past the TTL; run `shop sweep` to release them",
                report.sweepable_units()
            ));
        }
    }

    if !report.is_clean() {
        bail!("Audit found {} violation(s)", report.violations.len());
    }
    if !ctx.output.is_json() {
        ctx.output.success("Reservation counters match cart lines");
    }
    Ok(())
}

fn describe(violation: &Violation) -> String {
    match violation {
        Violation::NegativeReserved {
            product_id,
            size,
            reserved,
        } => format!("{product_id} ({size}): reserved is negative ({reserved})"),
        Violation::OverReserved {
            product_id,
            size,
            reserved,
            stock,
        } => format!("{product_id} ({size}): reserved {reserved} exceeds stock {stock}"),
        Violation::Drift {
            product_id,
            size,
            reserved,
            held_in_carts,
        } => format!(
            "{product_id} ({size}): counter says {reserved} reserved, carts hold {held_in_carts}"
        ),
        Violation::Orphaned {
            product_id,
            size,
            quantity,
        } => format!("{product_id} ({size}): {quantity} unit(s) in carts for a missing size"),
    }
}

//! Reservation audit.
//!
//! Cross-checks every variant's `reserved` counter against the cart lines
//! that hold it. With no writes in flight the two must match exactly, and
//! `0 <= reserved <= stock` must hold for every variant.

use crate::error::ShopResult;
use crate::repo;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use turbo_commerce::cart::Cart;
use turbo_commerce::catalog::Product;
use turbo_commerce::ProductId;
use turbo_db::Db;

/// Counters for one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantReport {
    pub product_id: ProductId,
    pub size: String,
    pub stock: i64,
    pub reserved: i64,
    /// Units held by cart lines.
    pub held_in_carts: i64,
    /// Units held by lines past the TTL (sweepable).
    pub held_expired: i64,
}

impl VariantReport {
    pub fn available(&self) -> i64 {
        self.stock - self.reserved
    }
}

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    NegativeReserved {
        product_id: ProductId,
        size: String,
        reserved: i64,
    },
    OverReserved {
        product_id: ProductId,
        size: String,
        reserved: i64,
        stock: i64,
    },
    /// Counter and cart lines disagree.
    Drift {
        product_id: ProductId,
        size: String,
        reserved: i64,
        held_in_carts: i64,
    },
    /// A cart line points at a variant that no longer exists.
    Orphaned {
        product_id: ProductId,
        size: String,
        quantity: i64,
    },
}

/// Audit result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub variants: Vec<VariantReport>,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Units the next sweep would give back.
    pub fn sweepable_units(&self) -> i64 {
        self.variants.iter().map(|v| v.held_expired).sum()
    }
}

/// Check every variant against the carts holding it.
///
/// Orphaned lines are reported but not counted as drift: their units were
/// never on a live counter.
pub async fn audit_reservations(
    db: &Db,
    now: DateTime<Utc>,
    ttl: Duration,
) -> ShopResult<AuditReport> {
    let products = db.scan::<Product>(repo::PRODUCTS).await?;
    let carts = db.scan::<Cart>(repo::CARTS).await?;

    let mut held: BTreeMap<(ProductId, String), (i64, i64)> = BTreeMap::new();
    for (_, doc) in &carts {
        for line in &doc.data.items {
            let entry = held
                .entry((line.product_id.clone(), line.size.clone()))
                .or_default();
            entry.0 += line.quantity;
            if line.is_expired(now, ttl) {
                entry.1 += line.quantity;
            }
        }
    }

    let mut report = AuditReport::default();
    for (_, doc) in &products {
        let product = &doc.data;
        for variant in &product.variants {
            let key = (product.id.clone(), variant.size.clone());
            let (held_in_carts, held_expired) = held.remove(&key).unwrap_or((0, 0));

            if variant.reserved < 0 {
                report.violations.push(Violation::NegativeReserved {
                    product_id: product.id.clone(),
                    size: variant.size.clone(),
                    reserved: variant.reserved,
                });
            }
            if variant.reserved > variant.stock {
                report.violations.push(Violation::OverReserved {
                    product_id: product.id.clone(),
                    size: variant.size.clone(),
                    reserved: variant.reserved,
                    stock: variant.stock,
                });
            }
            if variant.reserved != held_in_carts {
                report.violations.push(Violation::Drift {
                    product_id: product.id.clone(),
                    size: variant.size.clone(),
                    reserved: variant.reserved,
                    held_in_carts,
                });
            }

            report.variants.push(VariantReport {
                product_id: product.id.clone(),
                size: variant.size.clone(),
                stock: variant.stock,
                reserved: variant.reserved,
                held_in_carts,
                held_expired,
            });
        }
    }

    for ((product_id, size), (quantity, _)) in held {
        report.violations.push(Violation::Orphaned {
            product_id,
            size,
            quantity,
        });
    }

    if !report.is_clean() {
        tracing::warn!(violations = report.violations.len(), "Reservation audit found violations");
    }
    Ok(report)
}

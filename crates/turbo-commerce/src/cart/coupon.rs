//! Order-level coupon codes.

use crate::cart::Cart;
use crate::error::CommerceError;
use crate::ids::CouponId;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A coupon definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coupon {
    /// Unique coupon identifier.
    pub id: CouponId,
    /// Coupon code (e.g., "SAVE10"). Matched case-insensitively.
    pub code: String,
    /// Percentage off the cart total (0.0 - 100.0).
    pub discount_percent: f64,
    /// Minimum pre-coupon total.
    pub minimum_purchase: Money,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Whether the coupon can be redeemed at all.
    pub active: bool,
}

impl Coupon {
    /// Canonical form of a coupon code.
    pub fn normalize(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Check the coupon against a cart total and return the discount.
    ///
    /// `already_used` comes from the customer's used-coupons set.
    pub fn evaluate(
        &self,
        total: &Money,
        already_used: bool,
        now: DateTime<Utc>,
    ) -> Result<Money, CommerceError> {
        if !self.active {
            return Err(CommerceError::CouponInvalid(self.code.clone()));
        }
        if now < self.starts_at || now > self.expires_at {
            return Err(CommerceError::CouponExpired(self.code.clone()));
        }
        if already_used {
            return Err(CommerceError::CouponAlreadyUsed(self.code.clone()));
        }
        if total.currency != self.minimum_purchase.currency {
            return Err(CommerceError::CurrencyMismatch {
                expected: self.minimum_purchase.currency.code().to_string(),
                got: total.currency.code().to_string(),
            });
        }
        if total.amount_minor < self.minimum_purchase.amount_minor {
            return Err(CommerceError::CouponMinimumNotMet {
                code: self.code.clone(),
                minimum: self.minimum_purchase,
            });
        }
        let percent = self.discount_percent.clamp(0.0, 100.0);
        Ok(total.percentage(percent).min(*total))
    }
}

/// A coupon applied to a cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppliedCoupon {
    /// Normalized coupon code.
    pub code: String,
    /// Amount taken off `total`.
    pub discount: Money,
}

/// Apply `coupon` to `cart`, setting `new_total = total - discount`.
pub fn apply_coupon(
    cart: &mut Cart,
    coupon: &Coupon,
    already_used: bool,
    now: DateTime<Utc>,
) -> Result<AppliedCoupon, CommerceError> {
    let discount = coupon.evaluate(&cart.total, already_used, now)?;
    let new_total = cart
        .total
        .checked_sub(&discount)
        .ok_or(CommerceError::Overflow)?;
    let applied = AppliedCoupon {
        code: Coupon::normalize(&coupon.code),
        discount,
    };
    cart.coupon = Some(applied.clone());
    cart.new_total = new_total;
    Ok(applied)
}

/// Drop the coupon and reset `new_total = total`.
pub fn remove_coupon(cart: &mut Cart) -> Option<AppliedCoupon> {
    let removed = cart.coupon.take();
    cart.new_total = cart.total;
    removed
}

/// Re-evaluate the applied coupon after `total` changed.
///
/// `coupon` is the current definition (None if it no longer exists). If the
/// coupon no longer qualifies it is dropped; the error is returned so the
/// caller can tell the user.
pub fn refresh_coupon(
    cart: &mut Cart,
    coupon: Option<&Coupon>,
    now: DateTime<Utc>,
) -> Option<CommerceError> {
    let applied = cart.coupon.as_ref()?;
    let Some(coupon) = coupon else {
        let err = CommerceError::CouponInvalid(applied.code.clone());
        remove_coupon(cart);
        return Some(err);
    };
    // The used-coupons check happened when the coupon was applied.
    match apply_coupon(cart, coupon, false, now) {
        Ok(_) => None,
        Err(err) => {
            remove_coupon(cart);
            Some(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use crate::money::Currency;
    use chrono::Duration;

    fn inr(major: i64) -> Money {
        Money::from_major(major, Currency::INR)
    }

    fn save10(now: DateTime<Utc>) -> Coupon {
        Coupon {
            id: CouponId::new("c1"),
            code: "save10".into(),
            discount_percent: 10.0,
            minimum_purchase: inr(500),
            starts_at: now - Duration::days(1),
            expires_at: now + Duration::days(1),
            active: true,
        }
    }

    fn cart_with_total(total: Money, now: DateTime<Utc>) -> Cart {
        let mut cart = Cart::new(UserId::new("u1"), Currency::INR, now);
        cart.set_total(total);
        cart
    }

    #[test]
    fn test_ten_percent_off_thousand() {
        let now = Utc::now();
        let mut cart = cart_with_total(inr(1000), now);
        let applied = apply_coupon(&mut cart, &save10(now), false, now).unwrap();

        assert_eq!(applied.code, "SAVE10");
        assert_eq!(applied.discount, inr(100));
        assert_eq!(cart.new_total, inr(900));
        assert_eq!(cart.total, inr(1000));
    }

    #[test]
    fn test_rejections() {
        let now = Utc::now();
        let coupon = save10(now);

        let mut cart = cart_with_total(inr(1000), now);
        assert!(matches!(
            apply_coupon(&mut cart, &coupon, true, now),
            Err(CommerceError::CouponAlreadyUsed(_))
        ));

        let mut small = cart_with_total(inr(499), now);
        assert!(matches!(
            apply_coupon(&mut small, &coupon, false, now),
            Err(CommerceError::CouponMinimumNotMet { .. })
        ));
        assert!(small.coupon.is_none());
        assert_eq!(small.new_total, inr(499));

        let later = now + Duration::days(2);
        assert!(matches!(
            coupon.evaluate(&inr(1000), false, later),
            Err(CommerceError::CouponExpired(_))
        ));

        let mut inactive = coupon.clone();
        inactive.active = false;
        assert!(matches!(
            inactive.evaluate(&inr(1000), false, now),
            Err(CommerceError::CouponInvalid(_))
        ));
    }

    #[test]
    fn test_remove_resets_new_total() {
        let now = Utc::now();
        let mut cart = cart_with_total(inr(1000), now);
        apply_coupon(&mut cart, &save10(now), false, now).unwrap();

        assert!(remove_coupon(&mut cart).is_some());
        assert_eq!(cart.new_total, inr(1000));
    }

    #[test]
    fn test_refresh_recomputes_or_drops() {
        let now = Utc::now();
        let coupon = save10(now);
        let mut cart = cart_with_total(inr(1000), now);
        apply_coupon(&mut cart, &coupon, false, now).unwrap();

        cart.set_total(inr(2000));
        assert!(refresh_coupon(&mut cart, Some(&coupon), now).is_none());
        assert_eq!(cart.new_total, inr(1800));

        cart.set_total(inr(300));
        let err = refresh_coupon(&mut cart, Some(&coupon), now).unwrap();
        assert!(matches!(err, CommerceError::CouponMinimumNotMet { .. }));
        assert!(cart.coupon.is_none());
        assert_eq!(cart.new_total, inr(300));
    }
}

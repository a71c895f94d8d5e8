//! Customer records as seen by checkout: used coupons and addresses.

use crate::cart::Coupon;
use crate::ids::{AddressId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: String,
}

/// A customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: UserId,
    pub name: String,
    /// Normalized codes of coupons already redeemed.
    #[serde(default)]
    pub used_coupons: BTreeSet<String>,
    #[serde(default)]
    pub addresses: Vec<Address>,
}

impl Customer {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            used_coupons: BTreeSet::new(),
            addresses: Vec::new(),
        }
    }

    /// Check if the customer already redeemed `code`.
    pub fn has_used(&self, code: &str) -> bool {
        self.used_coupons.contains(&Coupon::normalize(code))
    }

    /// Mark `code` as redeemed.
    pub fn record_coupon(&mut self, code: &str) {
        self.used_coupons.insert(Coupon::normalize(code));
    }

    /// Look up one of the customer's addresses.
    pub fn address(&self, id: &AddressId) -> Option<&Address> {
        self.addresses.iter().find(|a| &a.id == id)
    }
}

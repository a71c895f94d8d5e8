//! Store layout and typed document access.
//!
//! Every aggregate is one JSON document; the store's per-document version is
//! the optimistic-lock token. Reads inside a [`Transaction`] pin versions, so
//! anything loaded through these helpers is checked again at commit.

use crate::error::ShopResult;
use chrono::{DateTime, Utc};
use turbo_commerce::cart::{Cart, Coupon, ProductMap};
use turbo_commerce::catalog::{CategoryOffer, OfferBook, Product, ProductOffer};
use turbo_commerce::checkout::{Order, PaymentRecord};
use turbo_commerce::customer::Customer;
use turbo_commerce::wallet::Wallet;
use turbo_commerce::{Currency, OrderId, ProductId, UserId};
use turbo_db::{Db, Transaction};

pub const PRODUCTS: &str = "products";
pub const CARTS: &str = "carts";
pub const ORDERS: &str = "orders";
pub const WALLETS: &str = "wallets";
pub const CUSTOMERS: &str = "customers";
/// Keyed by normalized code.
pub const COUPONS: &str = "coupons";
pub const PRODUCT_OFFERS: &str = "product_offers";
pub const CATEGORY_OFFERS: &str = "category_offers";
/// Consumed gateway payments, keyed by payment id.
pub const PAYMENTS: &str = "payments";
/// Gateway orders opened for checkout, keyed by gateway order id.
pub const GATEWAY_ORDERS: &str = "gateway_orders";

/// Sequence behind order display ids.
pub const ORDER_SEQUENCE: &str = "orders";

/// The user's cart, or a fresh empty one.
pub async fn load_cart(
    tx: &mut Transaction,
    user_id: &UserId,
    currency: Currency,
    now: DateTime<Utc>,
) -> ShopResult<Cart> {
    Ok(tx
        .get(CARTS, user_id.as_str())
        .await?
        .unwrap_or_else(|| Cart::new(user_id.clone(), currency, now)))
}

pub fn stage_cart(tx: &mut Transaction, cart: &Cart) -> ShopResult<()> {
    tx.put(CARTS, cart.user_id.as_str(), cart)?;
    Ok(())
}

/// Load products by id. Missing products are left out of the map.
pub async fn load_products<'a>(
    tx: &mut Transaction,
    ids: impl IntoIterator<Item = &'a ProductId>,
) -> ShopResult<ProductMap> {
    let mut products = ProductMap::new();
    for id in ids {
        if products.contains_key(id) {
            continue;
        }
        if let Some(product) = tx.get::<Product>(PRODUCTS, id.as_str()).await? {
            products.insert(id.clone(), product);
        }
    }
    Ok(products)
}

/// Products of every line in `cart`, plus `extra`.
pub async fn load_cart_products(
    tx: &mut Transaction,
    cart: &Cart,
    extra: Option<&ProductId>,
) -> ShopResult<ProductMap> {
    let ids: Vec<&ProductId> = cart
        .items
        .iter()
        .map(|i| &i.product_id)
        .chain(extra)
        .collect();
    load_products(tx, ids).await
}

/// Stage every product in `after` that differs from `before`.
///
/// Returns how many were staged.
pub fn stage_changed_products(
    tx: &mut Transaction,
    before: &ProductMap,
    after: &ProductMap,
) -> ShopResult<usize> {
    let mut staged = 0;
    for (id, product) in after {
        if before.get(id) != Some(product) {
            tx.put(PRODUCTS, id.as_str(), product)?;
            staged += 1;
        }
    }
    Ok(staged)
}

/// All offers, read outside any transaction.
///
/// Offers only move prices, never stock, so a slightly stale read is fine.
pub async fn load_offers(db: &Db) -> ShopResult<OfferBook> {
    let product_offers = db
        .scan::<ProductOffer>(PRODUCT_OFFERS)
        .await?
        .into_iter()
        .map(|(_, doc)| doc.into_inner())
        .collect();
    let category_offers = db
        .scan::<CategoryOffer>(CATEGORY_OFFERS)
        .await?
        .into_iter()
        .map(|(_, doc)| doc.into_inner())
        .collect();
    Ok(OfferBook::new(product_offers, category_offers))
}

pub async fn load_coupon(tx: &mut Transaction, code: &str) -> ShopResult<Option<Coupon>> {
    Ok(tx.get(COUPONS, &Coupon::normalize(code)).await?)
}

/// The customer record, or an empty one for first-time buyers.
pub async fn load_customer(tx: &mut Transaction, user_id: &UserId) -> ShopResult<Customer> {
    Ok(tx
        .get(CUSTOMERS, user_id.as_str())
        .await?
        .unwrap_or_else(|| Customer::new(user_id.clone(), "")))
}

/// The user's wallet, or an empty one.
pub async fn load_wallet(
    tx: &mut Transaction,
    user_id: &UserId,
    currency: Currency,
) -> ShopResult<Wallet> {
    Ok(tx
        .get(WALLETS, user_id.as_str())
        .await?
        .unwrap_or_else(|| Wallet::new(user_id.clone(), currency)))
}

pub async fn load_order(tx: &mut Transaction, order_id: &OrderId) -> ShopResult<Option<Order>> {
    Ok(tx.get(ORDERS, order_id.as_str()).await?)
}

pub async fn load_payment(
    tx: &mut Transaction,
    payment_id: &str,
) -> ShopResult<Option<PaymentRecord>> {
    Ok(tx.get(PAYMENTS, payment_id).await?)
}

/// Catalog writes used by admin tooling and fixtures.
pub mod catalog {
    use super::*;

    pub async fn put_product(db: &Db, product: &Product) -> ShopResult<u64> {
        Ok(db.put(PRODUCTS, product.id.as_str(), product).await?)
    }

    pub async fn put_coupon(db: &Db, coupon: &Coupon) -> ShopResult<u64> {
        Ok(db
            .put(COUPONS, &Coupon::normalize(&coupon.code), coupon)
            .await?)
    }

    pub async fn put_product_offer(db: &Db, offer: &ProductOffer) -> ShopResult<u64> {
        Ok(db.put(PRODUCT_OFFERS, offer.id.as_str(), offer).await?)
    }

    pub async fn put_category_offer(db: &Db, offer: &CategoryOffer) -> ShopResult<u64> {
        Ok(db.put(CATEGORY_OFFERS, offer.id.as_str(), offer).await?)
    }

    pub async fn put_customer(db: &Db, customer: &Customer) -> ShopResult<u64> {
        Ok(db.put(CUSTOMERS, customer.id.as_str(), customer).await?)
    }

    pub async fn put_wallet(db: &Db, wallet: &Wallet) -> ShopResult<u64> {
        Ok(db.put(WALLETS, wallet.user_id.as_str(), wallet).await?)
    }

    /// Remove a product from the catalog. Carts holding it see
    /// `ProductDeleted` on their next read.
    pub async fn delete_product(db: &Db, id: &ProductId) -> ShopResult<bool> {
        Ok(db.delete(PRODUCTS, id.as_str()).await?)
    }

    pub async fn get_product(db: &Db, id: &ProductId) -> ShopResult<Option<Product>> {
        Ok(db
            .get::<Product>(PRODUCTS, id.as_str())
            .await?
            .map(|doc| doc.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turbo_commerce::Money;

    fn tee() -> Product {
        Product::new(ProductId::new("tee"), "Tee", Money::from_major(500, Currency::INR))
            .with_variant("M", 5)
    }

    #[tokio::test]
    async fn test_only_changed_products_are_staged() {
        let db = Db::in_memory().unwrap();
        catalog::put_product(&db, &tee()).await.unwrap();
        let mut other = tee();
        other.id = ProductId::new("cap");
        catalog::put_product(&db, &other).await.unwrap();

        let mut tx = db.begin();
        let ids = [ProductId::new("tee"), ProductId::new("cap"), ProductId::new("gone")];
        let before = load_products(&mut tx, ids.iter()).await.unwrap();
        assert_eq!(before.len(), 2);

        let mut after = before.clone();
        if let Some(p) = after.get_mut(&ProductId::new("tee")) {
            p.reserve("M", 1).unwrap();
        }
        assert_eq!(stage_changed_products(&mut tx, &before, &after).unwrap(), 1);
        tx.commit().await.unwrap();

        assert_eq!(db.version(PRODUCTS, "tee").await.unwrap(), 2);
        assert_eq!(db.version(PRODUCTS, "cap").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_cart_and_wallet_start_empty() {
        let db = Db::in_memory().unwrap();
        let user = UserId::new("u1");
        let mut tx = db.begin();
        let cart = load_cart(&mut tx, &user, Currency::INR, Utc::now()).await.unwrap();
        let wallet = load_wallet(&mut tx, &user, Currency::INR).await.unwrap();
        assert!(cart.is_empty());
        assert!(wallet.balance.is_zero());
    }
}

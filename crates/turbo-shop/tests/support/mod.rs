//! Shared fixtures for the service tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use turbo_commerce::cart::Coupon;
use turbo_commerce::catalog::Product;
use turbo_commerce::checkout::{GatewayPayment, PaymentMethod};
use turbo_commerce::customer::{Address, Customer};
use turbo_commerce::wallet::Wallet;
use turbo_commerce::{AddressId, CouponId, Currency, Money, ProductId, UserId};
use turbo_db::Db;
use turbo_shop::repo::{self, catalog};
use turbo_shop::{
    CheckoutRequest, GatewayError, ManualClock, PaymentGateway, RetryPolicy, Shop, ShopConfig,
    SignatureVerifier,
};

pub const SECRET: &str = "test-gateway-secret";

pub fn inr(major: i64) -> Money {
    Money::from_major(major, Currency::INR)
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
}

/// Gateway double handing out sequential order ids.
#[derive(Debug, Default)]
pub struct StaticGateway {
    next: AtomicU32,
    pub fail: AtomicBool,
    pub amounts: Mutex<Vec<Money>>,
}

#[async_trait]
impl PaymentGateway for StaticGateway {
    async fn create_order(&self, amount: Money, _receipt: &str) -> Result<String, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.amounts.lock().unwrap().push(amount);
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("order_{n}"))
    }
}

pub struct Fixture {
    pub shop: Shop,
    pub clock: ManualClock,
    pub gateway: Arc<StaticGateway>,
    pub verifier: SignatureVerifier,
}

pub fn fixture() -> Fixture {
    fixture_with(ShopConfig::default())
}

pub fn fixture_with(mut config: ShopConfig) -> Fixture {
    config.gateway.key_secret = SECRET.to_string();
    let clock = ManualClock::new(start());
    let gateway = Arc::new(StaticGateway::default());
    let shop = Shop::builder(Db::in_memory().unwrap())
        .config(config)
        .clock(Arc::new(clock.clone()))
        .gateway(gateway.clone())
        .retry(RetryPolicy::new(20).with_jitter(true))
        .build();
    Fixture {
        shop,
        clock,
        gateway,
        verifier: SignatureVerifier::new(SECRET),
    }
}

impl Fixture {
    pub fn db(&self) -> &Db {
        self.shop.db()
    }

    pub async fn seed_product(&self, id: &str, price: i64, sizes: &[(&str, i64)]) -> ProductId {
        let mut product = Product::new(ProductId::new(id), id.to_uppercase(), inr(price));
        for (size, stock) in sizes {
            product = product.with_variant(*size, *stock);
        }
        catalog::put_product(self.db(), &product).await.unwrap();
        product.id
    }

    /// A customer with one address; returns the address id.
    pub async fn seed_customer(&self, user: &UserId) -> AddressId {
        let address = Address {
            id: AddressId::new(format!("{user}-home")),
            name: "Asha".into(),
            line1: "12 MG Road".into(),
            line2: None,
            city: "Bengaluru".into(),
            state: "KA".into(),
            postal_code: "560001".into(),
            phone: "9999999999".into(),
        };
        let mut customer = Customer::new(user.clone(), "Asha");
        customer.addresses.push(address.clone());
        catalog::put_customer(self.db(), &customer).await.unwrap();
        address.id
    }

    pub async fn seed_wallet(&self, user: &UserId, balance: Money) {
        let mut wallet = Wallet::new(user.clone(), Currency::INR);
        wallet.balance = balance;
        catalog::put_wallet(self.db(), &wallet).await.unwrap();
    }

    pub async fn seed_coupon(&self, code: &str, percent: f64, minimum: i64) {
        let coupon = Coupon {
            id: CouponId::new(code.to_lowercase()),
            code: code.to_string(),
            discount_percent: percent,
            minimum_purchase: inr(minimum),
            starts_at: start() - Duration::days(1),
            expires_at: start() + Duration::days(30),
            active: true,
        };
        catalog::put_coupon(self.db(), &coupon).await.unwrap();
    }

    pub async fn product(&self, id: &ProductId) -> Product {
        catalog::get_product(self.db(), id).await.unwrap().unwrap()
    }

    /// `(stock, reserved)` of one size.
    pub async fn counters(&self, id: &ProductId, size: &str) -> (i64, i64) {
        let product = self.product(id).await;
        let variant = product.variant(size).unwrap();
        (variant.stock, variant.reserved)
    }

    pub async fn wallet(&self, user: &UserId) -> Wallet {
        self.db()
            .get::<Wallet>(repo::WALLETS, user.as_str())
            .await
            .unwrap()
            .map(|doc| doc.into_inner())
            .unwrap_or_else(|| Wallet::new(user.clone(), Currency::INR))
    }

    pub async fn customer(&self, user: &UserId) -> Customer {
        self.db()
            .get::<Customer>(repo::CUSTOMERS, user.as_str())
            .await
            .unwrap()
            .unwrap()
            .into_inner()
    }

    /// A gateway payment signed with the fixture secret.
    pub fn signed_payment(&self, gateway_order_id: &str, payment_id: &str) -> GatewayPayment {
        let mut payment = GatewayPayment {
            gateway_order_id: gateway_order_id.to_string(),
            payment_id: payment_id.to_string(),
            signature: String::new(),
        };
        payment.signature = self.verifier.sign(&payment.signed_payload()).unwrap();
        payment
    }

    pub fn request(
        &self,
        user: &UserId,
        address: &AddressId,
        payment: PaymentMethod,
    ) -> CheckoutRequest {
        CheckoutRequest {
            user_id: user.clone(),
            address_id: address.clone(),
            payment,
            expected_total: None,
        }
    }

    /// Move the clock one second past the reservation TTL.
    pub fn advance_past_ttl(&self) {
        let ttl = self.shop.config().reservation_ttl();
        self.clock.advance(ttl + Duration::seconds(1));
    }

    pub async fn assert_ledger_consistent(&self) {
        let report = self.shop.audit().await.unwrap();
        assert!(report.is_clean(), "audit violations: {:?}", report.violations);
    }
}

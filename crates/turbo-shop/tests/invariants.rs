//! Ledger invariants under a long mixed sequence of operations.
//!
//! After every step: `0 <= reserved <= stock` for each variant, and the sum
//! of cart quantities per variant equals its `reserved` counter.

mod support;

use chrono::Duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use support::fixture;
use turbo_commerce::checkout::PaymentMethod;
use turbo_commerce::{ProductId, UserId};

#[tokio::test]
async fn test_random_operations_keep_ledger_consistent() {
    let fx = fixture();
    let products = vec![
        fx.seed_product("tee", 300, &[("S", 3), ("M", 4)]).await,
        fx.seed_product("cap", 200, &[("F", 2)]).await,
    ];
    let sizes = |id: &ProductId| -> &'static [&'static str] {
        if id.as_str() == "tee" {
            &["S", "M"]
        } else {
            &["F"]
        }
    };
    let users: Vec<UserId> = (0..4).map(|i| UserId::new(format!("u{i}"))).collect();
    let mut addresses = Vec::new();
    for user in &users {
        addresses.push(fx.seed_customer(user).await);
    }

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let who = rng.gen_range(0..users.len());
        let user = &users[who];
        let product = &products[rng.gen_range(0..products.len())];
        let size_choices = sizes(product);
        let size = size_choices[rng.gen_range(0..size_choices.len())];

        // Rejections are expected; only the ledger matters here.
        match rng.gen_range(0..7) {
            0 | 1 => {
                let _ = fx
                    .shop
                    .carts
                    .add_item(user, product, size, rng.gen_range(1..=3))
                    .await;
            }
            2 => {
                let view = fx.shop.carts.view_cart(user).await.unwrap();
                if let Some(line) = view.summary.items.first() {
                    let delta = if rng.gen_bool(0.5) { 1 } else { -1 };
                    let _ = fx.shop.carts.change_quantity(user, &line.id, delta).await;
                }
            }
            3 => {
                let view = fx.shop.carts.view_cart(user).await.unwrap();
                if let Some(line) = view.summary.items.last() {
                    let _ = fx.shop.carts.change_size(user, &line.id, size).await;
                }
            }
            4 => {
                let view = fx.shop.carts.view_cart(user).await.unwrap();
                if let Some(line) = view.summary.items.first() {
                    let _ = fx.shop.carts.remove_item(user, &line.id).await;
                }
            }
            5 => {
                let request =
                    fx.request(user, &addresses[who], PaymentMethod::CashOnDelivery);
                if fx.shop.checkout.checkout(&request).await.is_ok() {
                    let orders = fx.shop.orders.orders_for(user).await.unwrap();
                    if rng.gen_bool(0.5) {
                        let _ = fx
                            .shop
                            .orders
                            .cancel_order(user, &orders[0].id, "random")
                            .await;
                    }
                }
            }
            _ => {
                fx.clock.advance(Duration::minutes(rng.gen_range(1..=6)));
                fx.shop.sweeper.run_once().await.unwrap();
            }
        }

        fx.assert_ledger_consistent().await;
    }
}

#[tokio::test]
async fn test_deleted_size_is_dropped_on_read() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 300, &[("S", 3), ("M", 4)]).await;
    let user = UserId::new("u1");
    fx.shop.carts.add_item(&user, &tee, "S", 1).await.unwrap();
    fx.shop.carts.add_item(&user, &tee, "M", 2).await.unwrap();

    let mut product = fx.product(&tee).await;
    product.variants.retain(|v| v.size != "S");
    turbo_shop::repo::catalog::put_product(fx.db(), &product)
        .await
        .unwrap();

    let view = fx.shop.carts.view_cart(&user).await.unwrap();
    assert_eq!(view.summary.items.len(), 1);
    assert_eq!(view.summary.items[0].size, "M");
    assert_eq!(view.summary.unavailable_items.len(), 1);
    assert_eq!(view.summary.new_total, support::inr(600));
    fx.assert_ledger_consistent().await;
}

#[tokio::test]
async fn test_mirror_is_invalidated_on_mutation() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 300, &[("M", 4)]).await;
    let user = UserId::new("u1");
    fx.shop.carts.add_item(&user, &tee, "M", 1).await.unwrap();
    assert!(fx.shop.carts.mirrored_summary(&user).unwrap().is_none());

    fx.shop.carts.view_cart(&user).await.unwrap();
    let mirrored = fx.shop.carts.mirrored_summary(&user).unwrap().unwrap();
    assert_eq!(mirrored.items[0].quantity, 1);

    fx.shop.carts.add_item(&user, &tee, "M", 1).await.unwrap();
    assert!(fx.shop.carts.mirrored_summary(&user).unwrap().is_none());
}

//! Concurrent writers racing for the same stock.

mod support;

use std::time::Duration;
use support::fixture;
use tokio_util::sync::CancellationToken;
use turbo_commerce::checkout::PaymentMethod;
use turbo_commerce::{CommerceError, ErrorKind, UserId};
use turbo_shop::{RetryPolicy, Shop, ShopError};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_unit_goes_to_exactly_one_cart() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 1)]).await;

    let mut handles = Vec::new();
    for name in ["u1", "u2"] {
        let shop = fx.shop.clone();
        let tee = tee.clone();
        handles.push(tokio::spawn(async move {
            shop.carts.add_item(&UserId::new(name), &tee, "M", 1).await
        }));
    }

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::StockConflict),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(fx.counters(&tee, "M").await, (1, 1));
    fx.assert_ledger_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_shoppers_never_oversell() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 10)]).await;

    let mut handles = Vec::new();
    for i in 0..25 {
        let shop = fx.shop.clone();
        let tee = tee.clone();
        handles.push(tokio::spawn(async move {
            shop.carts
                .add_item(&UserId::new(format!("u{i}")), &tee, "M", 1)
                .await
        }));
    }

    let mut won = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            won += 1;
        }
    }
    assert_eq!(won, 10);
    assert_eq!(fx.counters(&tee, "M").await, (10, 10));
    fx.assert_ledger_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lost_races_report_the_contested_size() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 50)]).await;
    // No retries, so any lost version race surfaces to the caller.
    let shop = Shop::builder(fx.db().clone())
        .retry(RetryPolicy::none())
        .build();

    let mut handles = Vec::new();
    for i in 0..16 {
        let shop = shop.clone();
        let tee = tee.clone();
        handles.push(tokio::spawn(async move {
            shop.carts
                .add_item(&UserId::new(format!("u{i}")), &tee, "M", 1)
                .await
        }));
    }

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(ShopError::Commerce(CommerceError::StockConflict {
                product_id,
                size,
                available,
            })) => {
                assert_eq!(product_id, tee);
                assert_eq!(size, "M");
                assert!((0..50).contains(&available));
            }
            Err(other) => panic!("expected StockConflict, got {other:?}"),
        }
    }
    assert!(won >= 1);
    assert_eq!(fx.counters(&tee, "M").await, (50, won));
    fx.assert_ledger_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_gateway_payments_make_one_order() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    let address = fx.seed_customer(&user).await;
    fx.shop.carts.add_item(&user, &tee, "M", 2).await.unwrap();

    let gateway_order = fx.shop.checkout.begin_gateway_payment(&user).await.unwrap();
    let payment = fx.signed_payment(&gateway_order.gateway_order_id, "pay_1");
    let request = fx.request(&user, &address, PaymentMethod::Gateway(payment));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let shop = fx.shop.clone();
        let request = request.clone();
        handles.push(tokio::spawn(async move {
            shop.checkout.checkout(&request).await
        }));
    }

    let mut receipts = Vec::new();
    for handle in handles {
        receipts.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(receipts.iter().filter(|r| !r.replayed).count(), 1);
    assert!(receipts.iter().all(|r| r.order_id == receipts[0].order_id));

    assert_eq!(fx.shop.orders.orders_for(&user).await.unwrap().len(), 1);
    assert_eq!(fx.counters(&tee, "M").await, (3, 0));
    assert!(fx.wallet(&user).await.balance.is_zero());
    fx.assert_ledger_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweeper_and_reads_release_once() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 20)]).await;
    let users: Vec<UserId> = (0..8).map(|i| UserId::new(format!("u{i}"))).collect();
    for user in &users {
        fx.shop.carts.add_item(user, &tee, "M", 2).await.unwrap();
    }
    assert_eq!(fx.counters(&tee, "M").await, (20, 16));
    fx.advance_past_ttl();

    let mut handles = Vec::new();
    for user in users.clone() {
        let shop = fx.shop.clone();
        handles.push(tokio::spawn(async move {
            shop.carts.view_cart(&user).await.map(|_| ())
        }));
    }
    let shop = fx.shop.clone();
    handles.push(tokio::spawn(async move {
        shop.sweeper.run_once().await.map(|_| ())
    }));
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(fx.counters(&tee, "M").await, (20, 0));
    fx.assert_ledger_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_checkouts_race_with_adds() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 100, &[("M", 6)]).await;

    let buyers: Vec<UserId> = (0..3).map(|i| UserId::new(format!("buyer{i}"))).collect();
    let mut addresses = Vec::new();
    for buyer in &buyers {
        addresses.push(fx.seed_customer(buyer).await);
        fx.shop.carts.add_item(buyer, &tee, "M", 1).await.unwrap();
    }

    let mut handles = Vec::new();
    for (buyer, address) in buyers.iter().zip(&addresses) {
        let shop = fx.shop.clone();
        let request = fx.request(buyer, address, PaymentMethod::CashOnDelivery);
        handles.push(tokio::spawn(async move {
            shop.checkout.checkout(&request).await.map(|r| r.display_id)
        }));
    }
    for i in 0..5 {
        let shop = fx.shop.clone();
        let tee = tee.clone();
        handles.push(tokio::spawn(async move {
            shop.carts
                .add_item(&UserId::new(format!("browser{i}")), &tee, "M", 1)
                .await
                .map(|_| String::new())
        }));
    }

    let mut display_ids = Vec::new();
    for handle in handles {
        if let Ok(id) = handle.await.unwrap() {
            if !id.is_empty() {
                display_ids.push(id);
            }
        }
    }
    display_ids.sort();
    assert_eq!(display_ids, vec!["ORD-000001", "ORD-000002", "ORD-000003"]);

    // Three sold; the browsers could hold at most the other three.
    let (stock, reserved) = fx.counters(&tee, "M").await;
    assert_eq!(stock, 3);
    assert_eq!(reserved, 3);
    fx.assert_ledger_consistent().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spawned_sweeper_runs_until_cancelled() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    fx.shop.carts.add_item(&user, &tee, "M", 2).await.unwrap();
    fx.advance_past_ttl();

    let shutdown = CancellationToken::new();
    let handle = fx.shop.sweeper.spawn(shutdown.clone());

    // The first tick fires straight away.
    let mut released = false;
    for _ in 0..50 {
        if fx.counters(&tee, "M").await == (5, 0) {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(released);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}

//! End-to-end flows through the shop services.

mod support;

use support::{fixture, inr};
use turbo_commerce::cart::UnavailableReason;
use turbo_commerce::checkout::{OrderStatus, PaymentKind, PaymentMethod};
use turbo_commerce::{CommerceError, Currency, Money, UserId};
use turbo_shop::ShopError;

#[tokio::test]
async fn test_add_beyond_availability_changes_nothing() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");

    let view = fx.shop.carts.add_item(&user, &tee, "M", 3).await.unwrap();
    assert_eq!(view.summary.items[0].quantity, 3);
    assert_eq!(fx.counters(&tee, "M").await, (5, 3));
    assert_eq!(fx.product(&tee).await.variant("M").unwrap().available(), 2);

    let err = fx.shop.carts.add_item(&user, &tee, "M", 3).await.unwrap_err();
    assert!(matches!(
        err,
        ShopError::Commerce(CommerceError::InsufficientStock { available: 2, .. })
    ));
    assert!(err.user_message().starts_with("Only 2 items available"));

    assert_eq!(fx.counters(&tee, "M").await, (5, 3));
    let view = fx.shop.carts.view_cart(&user).await.unwrap();
    assert_eq!(view.summary.items.len(), 1);
    assert_eq!(view.summary.items[0].quantity, 3);
    fx.assert_ledger_consistent().await;
}

#[tokio::test]
async fn test_add_then_remove_restores_counter() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");

    let view = fx.shop.carts.add_item(&user, &tee, "M", 2).await.unwrap();
    let line = view.summary.items[0].id.clone();
    fx.shop.carts.remove_item(&user, &line).await.unwrap();

    assert_eq!(fx.counters(&tee, "M").await, (5, 0));
    let err = fx.shop.carts.remove_item(&user, &line).await.unwrap_err();
    assert_eq!(err.kind(), turbo_commerce::ErrorKind::NotFound);
    assert_eq!(fx.counters(&tee, "M").await, (5, 0));
}

#[tokio::test]
async fn test_quantity_and_size_changes_move_reservations() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 3), ("L", 2)]).await;
    let user = UserId::new("u1");

    let view = fx.shop.carts.add_item(&user, &tee, "M", 2).await.unwrap();
    let line = view.summary.items[0].id.clone();

    // The line's own units count as headroom.
    fx.shop.carts.change_quantity(&user, &line, 1).await.unwrap();
    assert_eq!(fx.counters(&tee, "M").await, (3, 3));
    let err = fx.shop.carts.change_quantity(&user, &line, 1).await.unwrap_err();
    assert_eq!(err.kind(), turbo_commerce::ErrorKind::StockConflict);

    // L only has 2, so moving 3 units fails and nothing moves.
    let err = fx.shop.carts.change_size(&user, &line, "L").await.unwrap_err();
    assert_eq!(err.kind(), turbo_commerce::ErrorKind::StockConflict);
    assert_eq!(fx.counters(&tee, "M").await, (3, 3));
    assert_eq!(fx.counters(&tee, "L").await, (2, 0));

    fx.shop.carts.change_quantity(&user, &line, -1).await.unwrap();
    let view = fx.shop.carts.change_size(&user, &line, "L").await.unwrap();
    assert_eq!(view.summary.items[0].size, "L");
    assert_eq!(fx.counters(&tee, "M").await, (3, 0));
    assert_eq!(fx.counters(&tee, "L").await, (2, 2));
    fx.assert_ledger_consistent().await;
}

#[tokio::test]
async fn test_sweeper_releases_expired_lines() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    fx.shop.carts.add_item(&user, &tee, "M", 3).await.unwrap();

    // Exactly at the TTL the line is still held.
    fx.clock.advance(fx.shop.config().reservation_ttl());
    let report = fx.shop.sweeper.run_once().await.unwrap();
    assert_eq!(report.lines_released, 0);
    assert_eq!(fx.counters(&tee, "M").await, (5, 3));

    fx.clock.advance(chrono::Duration::seconds(1));
    let report = fx.shop.sweeper.run_once().await.unwrap();
    assert_eq!(report.carts_scanned, 1);
    assert_eq!(report.carts_swept, 1);
    assert_eq!(report.lines_released, 1);
    assert_eq!(report.units_released, 3);
    assert_eq!(fx.counters(&tee, "M").await, (5, 0));

    // A second pass finds nothing left to release.
    let report = fx.shop.sweeper.run_once().await.unwrap();
    assert_eq!(report.lines_released, 0);
    assert_eq!(fx.counters(&tee, "M").await, (5, 0));
    fx.assert_ledger_consistent().await;
}

#[tokio::test]
async fn test_view_releases_expired_lines_inline() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    fx.shop.carts.add_item(&user, &tee, "M", 2).await.unwrap();
    fx.advance_past_ttl();

    let view = fx.shop.carts.view_cart(&user).await.unwrap();
    assert!(view.summary.items.is_empty());
    assert_eq!(view.summary.unavailable_items.len(), 1);
    assert_eq!(view.summary.unavailable_items[0].reason, UnavailableReason::Expired);
    assert_eq!(fx.counters(&tee, "M").await, (5, 0));

    let report = fx.shop.sweeper.run_once().await.unwrap();
    assert_eq!(report.lines_released, 0);
}

#[tokio::test]
async fn test_coupon_applies_once_per_customer() {
    let fx = fixture();
    let jacket = fx.seed_product("jacket", 1000, &[("M", 5)]).await;
    fx.seed_coupon("SAVE10", 10.0, 500).await;
    let user = UserId::new("u1");
    let address = fx.seed_customer(&user).await;

    fx.shop.carts.add_item(&user, &jacket, "M", 1).await.unwrap();
    let view = fx.shop.carts.apply_coupon(&user, "save10").await.unwrap();
    assert_eq!(view.summary.total, inr(1000));
    assert_eq!(view.summary.new_total, inr(900));
    assert_eq!(view.summary.coupon_code.as_deref(), Some("SAVE10"));

    let receipt = fx
        .shop
        .checkout
        .checkout(&fx.request(&user, &address, PaymentMethod::CashOnDelivery))
        .await
        .unwrap();
    assert_eq!(receipt.total, inr(900));
    assert_eq!(receipt.display_id, "ORD-000001");
    assert!(fx.customer(&user).await.has_used("SAVE10"));

    fx.shop.carts.add_item(&user, &jacket, "M", 1).await.unwrap();
    let err = fx.shop.carts.apply_coupon(&user, "SAVE10").await.unwrap_err();
    assert!(matches!(
        err,
        ShopError::Commerce(CommerceError::CouponAlreadyUsed(_))
    ));
}

#[tokio::test]
async fn test_coupon_dropped_when_minimum_no_longer_met() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 300, &[("M", 5)]).await;
    fx.seed_coupon("SAVE10", 10.0, 500).await;
    let user = UserId::new("u1");

    let view = fx.shop.carts.add_item(&user, &tee, "M", 2).await.unwrap();
    let line = view.summary.items[0].id.clone();
    let view = fx.shop.carts.apply_coupon(&user, "SAVE10").await.unwrap();
    assert_eq!(view.summary.new_total, inr(540));

    let view = fx.shop.carts.change_quantity(&user, &line, -1).await.unwrap();
    assert!(view.summary.coupon_code.is_none());
    assert_eq!(view.summary.new_total, inr(300));
    assert!(view.notice.is_some());
}

#[tokio::test]
async fn test_partial_cancellation_then_full() {
    let fx = fixture();
    let shirt = fx.seed_product("shirt", 400, &[("M", 4)]).await;
    let cap = fx.seed_product("cap", 300, &[("F", 2)]).await;
    let user = UserId::new("u1");
    let address = fx.seed_customer(&user).await;
    fx.seed_wallet(&user, inr(1000)).await;

    fx.shop.carts.add_item(&user, &shirt, "M", 1).await.unwrap();
    fx.shop.carts.add_item(&user, &cap, "F", 1).await.unwrap();
    let receipt = fx
        .shop
        .checkout
        .checkout(&fx.request(&user, &address, PaymentMethod::Wallet))
        .await
        .unwrap();
    assert_eq!(receipt.total, inr(700));
    assert_eq!(receipt.payment_method, PaymentKind::Wallet);
    assert_eq!(fx.wallet(&user).await.balance, inr(300));
    assert_eq!(fx.counters(&shirt, "M").await, (3, 0));

    let order = fx.shop.orders.get_order(&user, &receipt.order_id).await.unwrap();
    let first = order.items[0].id.clone();
    let second = order.items[1].id.clone();

    let order = fx
        .shop
        .orders
        .cancel_item(&user, &receipt.order_id, &first, "changed my mind")
        .await
        .unwrap();
    assert_eq!(order.total_amount, inr(300));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(fx.counters(&shirt, "M").await, (4, 0));
    assert_eq!(fx.wallet(&user).await.balance, inr(700));

    let order = fx
        .shop
        .orders
        .cancel_item(&user, &receipt.order_id, &second, "changed my mind")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.refunded, inr(700));
    assert_eq!(fx.counters(&cap, "F").await, (2, 0));
    assert_eq!(fx.wallet(&user).await.balance, inr(1000));
    fx.assert_ledger_consistent().await;
}

#[tokio::test]
async fn test_wallet_balance_boundary() {
    let fx = fixture();
    let shirt = fx.seed_product("shirt", 700, &[("M", 3)]).await;

    let exact = UserId::new("exact");
    let address = fx.seed_customer(&exact).await;
    fx.seed_wallet(&exact, inr(700)).await;
    fx.shop.carts.add_item(&exact, &shirt, "M", 1).await.unwrap();
    fx.shop
        .checkout
        .checkout(&fx.request(&exact, &address, PaymentMethod::Wallet))
        .await
        .unwrap();
    assert!(fx.wallet(&exact).await.balance.is_zero());

    let short = UserId::new("short");
    let address = fx.seed_customer(&short).await;
    let one_paisa = Money::new(1, Currency::INR);
    fx.seed_wallet(&short, inr(700).checked_sub(&one_paisa).unwrap()).await;
    fx.shop.carts.add_item(&short, &shirt, "M", 1).await.unwrap();
    let err = fx
        .shop
        .checkout
        .checkout(&fx.request(&short, &address, PaymentMethod::Wallet))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShopError::Commerce(CommerceError::InsufficientBalance { .. })
    ));

    // Nothing moved: the line is still reserved and no order was written.
    assert_eq!(fx.counters(&shirt, "M").await, (2, 1));
    assert_eq!(fx.shop.carts.view_cart(&short).await.unwrap().summary.items.len(), 1);
    assert!(fx.shop.orders.orders_for(&short).await.unwrap().is_empty());
    assert_eq!(fx.wallet(&short).await.balance.amount_minor, 69_999);
    fx.assert_ledger_consistent().await;
}

#[tokio::test]
async fn test_cash_on_delivery_limit_is_inclusive() {
    let fx = fixture();
    let watch = fx.seed_product("watch", 1000, &[("F", 2)]).await;
    let user = UserId::new("u1");
    let address = fx.seed_customer(&user).await;

    fx.shop.carts.add_item(&user, &watch, "F", 2).await.unwrap();
    let err = fx
        .shop
        .checkout
        .checkout(&fx.request(&user, &address, PaymentMethod::CashOnDelivery))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShopError::Commerce(CommerceError::CodLimitExceeded { .. })
    ));

    let line = fx.shop.carts.view_cart(&user).await.unwrap().summary.items[0].id.clone();
    fx.shop.carts.change_quantity(&user, &line, -1).await.unwrap();
    let receipt = fx
        .shop
        .checkout
        .checkout(&fx.request(&user, &address, PaymentMethod::CashOnDelivery))
        .await
        .unwrap();
    assert_eq!(receipt.total, inr(1000));
}

#[tokio::test]
async fn test_checkout_rejects_expired_cart() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    let address = fx.seed_customer(&user).await;
    fx.shop.carts.add_item(&user, &tee, "M", 1).await.unwrap();
    fx.advance_past_ttl();

    let err = fx
        .shop
        .checkout
        .checkout(&fx.request(&user, &address, PaymentMethod::CashOnDelivery))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), turbo_commerce::ErrorKind::ReservationExpired);
    assert_eq!(fx.counters(&tee, "M").await, (5, 0));
}

#[tokio::test]
async fn test_checkout_detects_changed_total() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    let address = fx.seed_customer(&user).await;
    fx.shop.carts.add_item(&user, &tee, "M", 1).await.unwrap();

    let mut request = fx.request(&user, &address, PaymentMethod::CashOnDelivery);
    request.expected_total = Some(inr(450));
    let err = fx.shop.checkout.checkout(&request).await.unwrap_err();
    assert!(matches!(
        err,
        ShopError::Commerce(CommerceError::TotalChanged { .. })
    ));
    assert_eq!(fx.counters(&tee, "M").await, (5, 1));
}

#[tokio::test]
async fn test_gateway_payment_commits_once() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    let address = fx.seed_customer(&user).await;
    fx.shop.carts.add_item(&user, &tee, "M", 2).await.unwrap();

    let gateway_order = fx.shop.checkout.begin_gateway_payment(&user).await.unwrap();
    assert_eq!(gateway_order.amount, inr(1000));
    assert_eq!(fx.gateway.amounts.lock().unwrap().as_slice(), &[inr(1000)]);

    let payment = fx.signed_payment(&gateway_order.gateway_order_id, "pay_1");
    let request = fx.request(&user, &address, PaymentMethod::Gateway(payment));
    let receipt = fx.shop.checkout.checkout(&request).await.unwrap();
    assert!(!receipt.replayed);
    assert_eq!(receipt.payment_method, PaymentKind::Gateway);
    assert_eq!(fx.counters(&tee, "M").await, (3, 0));

    // Same payment again: the existing order comes back, nothing new is sold.
    let again = fx.shop.checkout.checkout(&request).await.unwrap();
    assert!(again.replayed);
    assert_eq!(again.order_id, receipt.order_id);
    assert_eq!(fx.counters(&tee, "M").await, (3, 0));
    assert_eq!(fx.shop.orders.orders_for(&user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_gateway_signature_mismatch_is_rejected() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    let address = fx.seed_customer(&user).await;
    fx.shop.carts.add_item(&user, &tee, "M", 1).await.unwrap();
    let gateway_order = fx.shop.checkout.begin_gateway_payment(&user).await.unwrap();

    let mut payment = fx.signed_payment(&gateway_order.gateway_order_id, "pay_1");
    payment.payment_id = "pay_2".into();
    let err = fx
        .shop
        .checkout
        .checkout(&fx.request(&user, &address, PaymentMethod::Gateway(payment)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShopError::Commerce(CommerceError::InvalidPaymentSignature)
    ));
    assert_eq!(fx.counters(&tee, "M").await, (5, 1));
    assert!(fx.wallet(&user).await.balance.is_zero());
}

#[tokio::test]
async fn test_failed_gateway_commit_is_compensated() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    let address = fx.seed_customer(&user).await;
    fx.shop.carts.add_item(&user, &tee, "M", 2).await.unwrap();
    let gateway_order = fx.shop.checkout.begin_gateway_payment(&user).await.unwrap();

    // Reservation runs out while the customer is paying.
    fx.advance_past_ttl();
    let payment = fx.signed_payment(&gateway_order.gateway_order_id, "pay_1");
    let request = fx.request(&user, &address, PaymentMethod::Gateway(payment));
    let err = fx.shop.checkout.checkout(&request).await.unwrap_err();
    match &err {
        ShopError::Compensated { refunded, .. } => assert_eq!(*refunded, inr(1000)),
        other => panic!("expected compensation, got {other:?}"),
    }
    assert_eq!(fx.wallet(&user).await.balance, inr(1000));
    assert_eq!(fx.counters(&tee, "M").await, (5, 0));

    // The consumed payment can't be used again or refunded twice.
    let err = fx.shop.checkout.checkout(&request).await.unwrap_err();
    assert!(matches!(
        err,
        ShopError::Commerce(CommerceError::PaymentAlreadyConsumed(_))
    ));
    assert_eq!(fx.wallet(&user).await.balance, inr(1000));
    fx.assert_ledger_consistent().await;
}

#[tokio::test]
async fn test_gateway_outage_leaves_cart_alone() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    fx.shop.carts.add_item(&user, &tee, "M", 1).await.unwrap();
    fx.gateway
        .fail
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let err = fx.shop.checkout.begin_gateway_payment(&user).await.unwrap_err();
    assert!(matches!(err, ShopError::Gateway(_)));
    assert_eq!(fx.counters(&tee, "M").await, (5, 1));
}

#[tokio::test]
async fn test_return_flow_restocks_and_refunds() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let user = UserId::new("u1");
    let address = fx.seed_customer(&user).await;
    fx.shop.carts.add_item(&user, &tee, "M", 2).await.unwrap();
    let receipt = fx
        .shop
        .checkout
        .checkout(&fx.request(&user, &address, PaymentMethod::CashOnDelivery))
        .await
        .unwrap();
    let order_id = receipt.order_id;

    let err = fx
        .shop
        .orders
        .request_return(&user, &order_id, "too small")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), turbo_commerce::ErrorKind::StateConflict);

    for _ in 0..3 {
        fx.shop.orders.advance_status(&order_id).await.unwrap();
    }
    let err = fx.shop.orders.cancel_order(&user, &order_id, "late").await.unwrap_err();
    assert_eq!(err.kind(), turbo_commerce::ErrorKind::StateConflict);

    let order = fx
        .shop
        .orders
        .request_return(&user, &order_id, "too small")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::ReturnRequested);

    let order = fx.shop.orders.resolve_return(&order_id, true).await.unwrap();
    assert_eq!(order.status, OrderStatus::Returned);
    assert_eq!(fx.counters(&tee, "M").await, (5, 0));
    assert_eq!(fx.wallet(&user).await.balance, inr(1000));
}

#[tokio::test]
async fn test_orders_are_private_to_their_owner() {
    let fx = fixture();
    let tee = fx.seed_product("tee", 500, &[("M", 5)]).await;
    let owner = UserId::new("owner");
    let address = fx.seed_customer(&owner).await;
    fx.shop.carts.add_item(&owner, &tee, "M", 1).await.unwrap();
    let receipt = fx
        .shop
        .checkout
        .checkout(&fx.request(&owner, &address, PaymentMethod::CashOnDelivery))
        .await
        .unwrap();

    let stranger = UserId::new("stranger");
    let err = fx
        .shop
        .orders
        .cancel_order(&stranger, &receipt.order_id, "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, ShopError::Commerce(CommerceError::OrderNotFound(_))));
    assert!(fx.shop.orders.get_order(&stranger, &receipt.order_id).await.is_err());

    let order = fx.shop.orders.cancel_order(&owner, &receipt.order_id, "oops").await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    // Cash on delivery: nothing to refund.
    assert!(fx.wallet(&owner).await.balance.is_zero());
    assert_eq!(fx.counters(&tee, "M").await, (5, 0));
}

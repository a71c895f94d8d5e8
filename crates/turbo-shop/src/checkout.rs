//! Checkout orchestration.
//!
//! ```text
//! CART_VALIDATED -> [PAYMENT_AUTHORIZING] -> PAYMENT_VERIFIED -> ORDER_COMMITTED
//!        |                  |                      |
//!        +------------------+----> CART_UNCHANGED  +----> COMPENSATED (gateway only)
//! ```
//!
//! The order write, the stock decrement, the wallet debit, the coupon
//! redemption and the cart clear happen in one store transaction. Gateway
//! payments are taken outside the store, so a failure after the signature is
//! verified is compensated: the cart's reservations are released, the amount
//! is credited to the wallet and the payment id is recorded as consumed.

use crate::cart::{log_movements, mirror_key, refresh_cart, settle_totals};
use crate::error::{ShopError, ShopResult};
use crate::gateway::{receipt_for, GatewayOrder, PaymentGateway, SignatureVerifier};
use crate::repo;
use crate::shop::Shared;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use turbo_commerce::cart::{release_line, validate_cart, Cart};
use turbo_commerce::catalog::AdjustmentReason;
use turbo_commerce::checkout::{
    check_cod_limit, commit_cart, CheckoutAttempt, CheckoutStage, GatewayPayment, Order,
    PaymentKind, PaymentMethod, PaymentOutcome, PaymentRecord,
};
use turbo_commerce::wallet::WalletReason;
use turbo_commerce::{AddressId, CommerceError, Money, OrderId, UserId};

/// A checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub address_id: AddressId,
    pub payment: PaymentMethod,
    /// Total the customer saw. Checkout fails with `TotalChanged` if the
    /// revalidated total differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_total: Option<Money>,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub display_id: String,
    pub total: Money,
    pub payment_method: PaymentKind,
    /// Stages the attempt passed through.
    pub stages: Vec<CheckoutStage>,
    /// True when a repeated gateway payment returned the order it already
    /// created.
    pub replayed: bool,
}

fn receipt(order: &Order, attempt: CheckoutAttempt) -> CheckoutReceipt {
    CheckoutReceipt {
        order_id: order.id.clone(),
        display_id: order.display_id.clone(),
        total: order.total_amount,
        payment_method: order.payment_method,
        stages: attempt.history,
        replayed: false,
    }
}

enum Commit {
    Created(Box<Order>),
    Replayed(OrderId),
}

/// Checkout and gateway payment setup.
#[derive(Clone)]
pub struct CheckoutService {
    shared: Arc<Shared>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: SignatureVerifier,
}

impl std::fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService").finish_non_exhaustive()
    }
}

impl CheckoutService {
    pub(crate) fn new(
        shared: Arc<Shared>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: SignatureVerifier,
    ) -> Self {
        Self {
            shared,
            gateway,
            verifier,
        }
    }

    /// Revalidate the cart and return the amount due.
    ///
    /// Expired or removed lines are released and dropped first; the call
    /// fails if anything in the cart is unavailable.
    async fn validated_total(&self, user_id: &UserId) -> ShopResult<Money> {
        let view = refresh_cart(&self.shared, user_id).await?;
        if !view.summary.unavailable_items.is_empty() {
            return Err(CommerceError::CartUnavailable(view.summary.unavailable_items).into());
        }
        if view.summary.items.is_empty() {
            return Err(CommerceError::EmptyCart.into());
        }
        Ok(view.summary.new_total)
    }

    /// Open a gateway order for the cart's current total.
    ///
    /// The customer pays against the returned order; the gateway then hands
    /// back a signed [`GatewayPayment`] for [`CheckoutService::checkout`].
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn begin_gateway_payment(&self, user_id: &UserId) -> ShopResult<GatewayOrder> {
        let amount = self.validated_total(user_id).await?;
        let mut attempt = CheckoutAttempt::new();
        attempt.advance(CheckoutStage::PaymentAuthorizing)?;

        let receipt = receipt_for(user_id, amount.currency);
        let gateway_order_id = match self.gateway.create_order(amount, &receipt).await {
            Ok(id) => id,
            Err(err) => {
                attempt.fail(false);
                tracing::warn!(%user_id, error = %err, "Gateway order creation failed");
                return Err(err.into());
            }
        };

        let order = GatewayOrder {
            gateway_order_id,
            amount,
            user_id: user_id.clone(),
        };
        self.shared
            .db
            .put(repo::GATEWAY_ORDERS, &order.gateway_order_id, &order)
            .await?;
        tracing::info!(
            %user_id,
            gateway_order_id = %order.gateway_order_id,
            amount = %amount,
            "Gateway order opened"
        );
        Ok(order)
    }

    /// Turn the cart into an order.
    #[tracing::instrument(
        skip_all,
        fields(user_id = %request.user_id, payment = request.payment.kind().as_str())
    )]
    pub async fn checkout(&self, request: &CheckoutRequest) -> ShopResult<CheckoutReceipt> {
        match &request.payment {
            PaymentMethod::Gateway(payment) => self.checkout_gateway(request, payment).await,
            PaymentMethod::CashOnDelivery | PaymentMethod::Wallet => {
                self.checkout_direct(request).await
            }
        }
    }

    async fn checkout_direct(&self, request: &CheckoutRequest) -> ShopResult<CheckoutReceipt> {
        let user_id = &request.user_id;
        let total = self.validated_total(user_id).await?;
        let mut attempt = CheckoutAttempt::new();

        let result: ShopResult<Commit> = async {
            if let Some(expected) = request.expected_total {
                if expected != total {
                    return Err(CommerceError::TotalChanged {
                        expected,
                        actual: total,
                    }
                    .into());
                }
            }
            if request.payment.kind() == PaymentKind::CashOnDelivery {
                check_cod_limit(&total, &self.shared.config.cod_limit())?;
            }
            self.commit(request, total, None).await
        }
        .await;

        match result {
            Ok(Commit::Created(order)) => {
                attempt.advance(CheckoutStage::PaymentVerified)?;
                attempt.advance(CheckoutStage::OrderCommitted)?;
                Ok(receipt(&order, attempt))
            }
            Ok(Commit::Replayed(order_id)) => self.replayed_receipt(&order_id).await,
            Err(err) => {
                let stage = attempt.fail(false);
                tracing::info!(%user_id, %stage, error = %err, "Checkout failed");
                Err(err)
            }
        }
    }

    async fn checkout_gateway(
        &self,
        request: &CheckoutRequest,
        payment: &GatewayPayment,
    ) -> ShopResult<CheckoutReceipt> {
        let user_id = &request.user_id;
        self.verifier.verify(payment).inspect_err(|_| {
            tracing::warn!(
                %user_id,
                payment_id = %payment.payment_id,
                "Payment signature mismatch"
            );
        })?;

        if let Some(record) = self
            .shared
            .db
            .get::<PaymentRecord>(repo::PAYMENTS, &payment.payment_id)
            .await?
        {
            return self.replay(record.into_inner()).await;
        }

        let gateway_order = self
            .shared
            .db
            .get::<GatewayOrder>(repo::GATEWAY_ORDERS, &payment.gateway_order_id)
            .await?
            .map(|doc| doc.into_inner())
            .filter(|o| &o.user_id == user_id)
            .ok_or_else(|| {
                CommerceError::Validation(format!(
                    "unknown gateway order {}",
                    payment.gateway_order_id
                ))
            })?;
        let paid = gateway_order.amount;

        let mut attempt = CheckoutAttempt::new();
        attempt.advance(CheckoutStage::PaymentAuthorizing)?;
        attempt.advance(CheckoutStage::PaymentVerified)?;

        let result: ShopResult<Commit> = async {
            let total = self.validated_total(user_id).await?;
            if total != paid {
                return Err(CommerceError::TotalChanged {
                    expected: paid,
                    actual: total,
                }
                .into());
            }
            self.commit(request, paid, Some((payment, paid))).await
        }
        .await;

        match result {
            Ok(Commit::Created(order)) => {
                attempt.advance(CheckoutStage::OrderCommitted)?;
                Ok(receipt(&order, attempt))
            }
            Ok(Commit::Replayed(order_id)) => self.replayed_receipt(&order_id).await,
            Err(err @ ShopError::Commerce(CommerceError::PaymentAlreadyConsumed(_))) => Err(err),
            Err(err) => {
                if let Some(existing) = self.compensate(user_id, payment, paid, &err).await? {
                    return self.replay(existing).await;
                }
                let stage = attempt.fail(true);
                tracing::warn!(
                    %user_id,
                    %stage,
                    payment_id = %payment.payment_id,
                    refunded = %paid,
                    error = %err,
                    "Checkout failed after payment, amount credited to wallet"
                );
                Err(ShopError::Compensated {
                    payment_id: payment.payment_id.clone(),
                    refunded: paid,
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn replay(&self, record: PaymentRecord) -> ShopResult<CheckoutReceipt> {
        match record.committed_order() {
            Some((order_id, display_id)) => {
                tracing::info!(
                    payment_id = %record.payment_id,
                    order = display_id,
                    "Payment already turned into an order"
                );
                self.replayed_receipt(order_id).await
            }
            None => Err(CommerceError::PaymentAlreadyConsumed(record.payment_id).into()),
        }
    }

    async fn replayed_receipt(&self, order_id: &OrderId) -> ShopResult<CheckoutReceipt> {
        let order = self
            .shared
            .db
            .get::<Order>(repo::ORDERS, order_id.as_str())
            .await?
            .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))?
            .into_inner();
        Ok(CheckoutReceipt {
            order_id: order.id,
            display_id: order.display_id,
            total: order.total_amount,
            payment_method: order.payment_method,
            stages: vec![CheckoutStage::OrderCommitted],
            replayed: true,
        })
    }

    async fn commit(
        &self,
        request: &CheckoutRequest,
        expected: Money,
        gateway: Option<(&GatewayPayment, Money)>,
    ) -> ShopResult<Commit> {
        let commit = self
            .shared
            .retry
            .run("checkout", || self.commit_once(request, expected, gateway))
            .await?;
        if let Commit::Created(order) = &commit {
            self.shared.cache.delete(&mirror_key(&request.user_id));
            tracing::info!(
                user_id = %order.user_id,
                order = %order.display_id,
                total = %order.total_amount,
                method = order.payment_method.as_str(),
                "Order placed"
            );
        }
        Ok(commit)
    }

    async fn commit_once(
        &self,
        request: &CheckoutRequest,
        expected: Money,
        gateway: Option<(&GatewayPayment, Money)>,
    ) -> ShopResult<Commit> {
        let shared = &self.shared;
        let user_id = &request.user_id;
        let now = shared.clock.now();
        let offers = repo::load_offers(&shared.db).await?;
        let mut tx = shared.db.begin();

        if let Some((payment, _)) = gateway {
            if let Some(record) = repo::load_payment(&mut tx, &payment.payment_id).await? {
                return match record.committed_order() {
                    Some((order_id, _)) => Ok(Commit::Replayed(order_id.clone())),
                    None => Err(CommerceError::PaymentAlreadyConsumed(record.payment_id).into()),
                };
            }
        }

        let mut cart =
            repo::load_cart(&mut tx, user_id, shared.config.checkout.currency, now).await?;
        if cart.is_empty() {
            return Err(CommerceError::EmptyCart.into());
        }
        let before = repo::load_cart_products(&mut tx, &cart, None).await?;
        let mut products = before.clone();

        let check = validate_cart(&mut cart, &mut products, now, shared.config.reservation_ttl())?;
        if !check.unavailable.is_empty() {
            return Err(CommerceError::CartUnavailable(check.unavailable).into());
        }
        settle_totals(&mut tx, &mut cart, &products, &offers, now).await?;
        if cart.new_total != expected {
            return Err(CommerceError::TotalChanged {
                expected,
                actual: cart.new_total,
            }
            .into());
        }

        let mut customer = repo::load_customer(&mut tx, user_id).await?;
        if customer.address(&request.address_id).is_none() {
            return Err(CommerceError::Validation(format!(
                "address {} not found",
                request.address_id
            ))
            .into());
        }
        if let Some(coupon) = &cart.coupon {
            if customer.has_used(&coupon.code) {
                return Err(CommerceError::CouponAlreadyUsed(coupon.code.clone()).into());
            }
        }
        if request.payment.kind() == PaymentKind::CashOnDelivery {
            check_cod_limit(&cart.new_total, &shared.config.cod_limit())?;
        }

        let sequence = tx.next_sequence(repo::ORDER_SEQUENCE).await?;
        let committed = commit_cart(
            &mut cart,
            &mut products,
            request.address_id.clone(),
            &request.payment,
            sequence,
            now,
        )?;
        let order = committed.order;

        match (&request.payment, gateway) {
            (PaymentMethod::Wallet, _) => {
                let mut wallet =
                    repo::load_wallet(&mut tx, user_id, shared.config.checkout.currency).await?;
                wallet.debit(order.total_amount, WalletReason::Purchase, &order.display_id, now)?;
                tx.put(repo::WALLETS, user_id.as_str(), &wallet)?;
            }
            (PaymentMethod::Gateway(_), Some((payment, paid))) => {
                let record = PaymentRecord {
                    payment_id: payment.payment_id.clone(),
                    gateway_order_id: payment.gateway_order_id.clone(),
                    user_id: user_id.clone(),
                    amount: paid,
                    outcome: PaymentOutcome::Committed {
                        order_id: order.id.clone(),
                        display_id: order.display_id.clone(),
                    },
                    recorded_at: now,
                };
                tx.put(repo::PAYMENTS, &payment.payment_id, &record)?;
            }
            _ => {}
        }

        if let Some(code) = &committed.used_coupon {
            customer.record_coupon(code);
            tx.put(repo::CUSTOMERS, user_id.as_str(), &customer)?;
        }
        tx.put(repo::ORDERS, order.id.as_str(), &order)?;
        repo::stage_cart(&mut tx, &cart)?;
        repo::stage_changed_products(&mut tx, &before, &products)?;
        tx.commit().await?;

        log_movements(user_id, &committed.movements);
        Ok(Commit::Created(Box::new(order)))
    }

    /// Undo a verified gateway payment that produced no order.
    ///
    /// If the payment id was already recorded (a concurrent request got
    /// there first) nothing is changed and that record is returned.
    async fn compensate(
        &self,
        user_id: &UserId,
        payment: &GatewayPayment,
        paid: Money,
        cause: &ShopError,
    ) -> ShopResult<Option<PaymentRecord>> {
        let reason = cause.to_string();
        let existing = self
            .shared
            .retry
            .run("compensate", || self.compensate_once(user_id, payment, paid, &reason))
            .await?;
        self.shared.cache.delete(&mirror_key(user_id));
        Ok(existing)
    }

    async fn compensate_once(
        &self,
        user_id: &UserId,
        payment: &GatewayPayment,
        paid: Money,
        reason: &str,
    ) -> ShopResult<Option<PaymentRecord>> {
        let shared = &self.shared;
        let now = shared.clock.now();
        let mut tx = shared.db.begin();

        if let Some(existing) = repo::load_payment(&mut tx, &payment.payment_id).await? {
            return Ok(Some(existing));
        }

        let mut movements = Vec::new();
        if let Some(mut cart) = tx.get::<Cart>(repo::CARTS, user_id.as_str()).await? {
            let before = repo::load_cart_products(&mut tx, &cart, None).await?;
            let mut products = before.clone();
            let lines: Vec<_> = cart
                .items
                .iter()
                .map(|l| (l.id.clone(), l.product_id.clone()))
                .collect();
            for (line_id, product_id) in lines {
                let (_, movement) = release_line(
                    &mut cart,
                    &line_id,
                    products.get_mut(&product_id),
                    AdjustmentReason::Released,
                    now,
                )?;
                movements.extend(movement);
            }
            cart.clear(now);
            repo::stage_cart(&mut tx, &cart)?;
            repo::stage_changed_products(&mut tx, &before, &products)?;
        }

        let mut wallet = repo::load_wallet(&mut tx, user_id, paid.currency).await?;
        wallet.credit(paid, WalletReason::Compensation, &payment.payment_id, now)?;
        tx.put(repo::WALLETS, user_id.as_str(), &wallet)?;

        let record = PaymentRecord {
            payment_id: payment.payment_id.clone(),
            gateway_order_id: payment.gateway_order_id.clone(),
            user_id: user_id.clone(),
            amount: paid,
            outcome: PaymentOutcome::Refunded {
                reason: reason.to_string(),
            },
            recorded_at: now,
        };
        tx.put(repo::PAYMENTS, &payment.payment_id, &record)?;
        tx.commit().await?;
        log_movements(user_id, &movements);
        Ok(None)
    }
}

//! External payment gateway.
//!
//! The gateway is only trusted through its HMAC signature: a payment is
//! accepted when `hex(HMAC-SHA256(key_secret, "gateway_order_id|payment_id"))`
//! matches the signature the client sent back.

use crate::config::GatewayConfig;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use turbo_commerce::checkout::GatewayPayment;
use turbo_commerce::{CommerceError, Currency, Money, UserId};

type HmacSha256 = Hmac<Sha256>;

/// Gateway call failures.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport failure.
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with an error status.
    #[error("gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The gateway answered with something unexpected.
    #[error("unexpected gateway response: {0}")]
    Response(String),

    /// No gateway configured.
    #[error("payment gateway is not configured")]
    NotConfigured,
}

/// A gateway-side order the customer pays against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayOrder {
    pub gateway_order_id: String,
    pub amount: Money,
    pub user_id: UserId,
}

/// Creates gateway orders.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open an order for `amount`. `receipt` is echoed back by the gateway.
    async fn create_order(&self, amount: Money, receipt: &str) -> Result<String, GatewayError>;
}

/// Gateway used when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_order(&self, _amount: Money, _receipt: &str) -> Result<String, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
}

/// REST gateway client (basic auth with key id and secret).
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or(GatewayError::NotConfigured)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_order(&self, amount: Money, receipt: &str) -> Result<String, GatewayError> {
        let resp = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CreateOrderRequest {
                amount: amount.amount_minor,
                currency: amount.currency.code(),
                receipt,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Gateway rejected order creation");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let order: CreateOrderResponse = resp.json().await?;
        if order.id.is_empty() {
            return Err(GatewayError::Response("empty order id".into()));
        }
        Ok(order.id)
    }
}

/// Checks payment signatures.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, CommerceError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| CommerceError::InvalidPaymentSignature)
    }

    /// Hex signature of `payload`.
    pub fn sign(&self, payload: &str) -> Result<String, CommerceError> {
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a gateway payment in constant time.
    pub fn verify(&self, payment: &GatewayPayment) -> Result<(), CommerceError> {
        if self.secret.is_empty() {
            return Err(CommerceError::InvalidPaymentSignature);
        }
        let mut mac = self.mac()?;
        mac.update(payment.signed_payload().as_bytes());
        let signature =
            hex::decode(&payment.signature).map_err(|_| CommerceError::InvalidPaymentSignature)?;
        mac.verify_slice(&signature)
            .map_err(|_| CommerceError::InvalidPaymentSignature)
    }
}

/// Receipt string sent with a gateway order.
pub fn receipt_for(user_id: &UserId, currency: Currency) -> String {
    format!("cart-{}-{}", user_id, currency.code().to_lowercase())
}

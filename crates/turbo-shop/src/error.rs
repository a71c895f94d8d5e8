//! Service-level errors.

use crate::config::ConfigError;
use crate::gateway::GatewayError;
use thiserror::Error;
use turbo_cache::CacheError;
use turbo_commerce::{CommerceError, ErrorKind, Money};
use turbo_db::DbError;

/// Errors returned by the shop services.
#[derive(Error, Debug)]
pub enum ShopError {
    /// A domain rule rejected the request.
    #[error(transparent)]
    Commerce(#[from] CommerceError),

    /// Store failure.
    #[error("store error: {0}")]
    Db(#[from] DbError),

    /// Session mirror failure.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Payment gateway failure.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Conflict retries ran out.
    #[error("{operation} still conflicting after {attempts} attempts")]
    Contended { operation: &'static str, attempts: u32 },

    /// The gateway took money but no order could be created; the amount was
    /// credited to the wallet.
    #[error("payment {payment_id} compensated ({refunded}): {reason}")]
    Compensated {
        payment_id: String,
        refunded: Money,
        reason: String,
    },
}

impl ShopError {
    /// Error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShopError::Commerce(e) => e.kind(),
            ShopError::Db(DbError::NotFound { .. }) => ErrorKind::NotFound,
            ShopError::Db(DbError::VersionConflict { .. }) | ShopError::Contended { .. } => {
                ErrorKind::StockConflict
            }
            ShopError::Gateway(_) | ShopError::Compensated { .. } => ErrorKind::Payment,
            ShopError::Config(_) => ErrorKind::Validation,
            ShopError::Db(_) | ShopError::Cache(_) => ErrorKind::Internal,
        }
    }

    /// True if the operation may succeed when run again from scratch.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ShopError::Db(e) if e.is_conflict())
    }

    /// Message safe to show to a customer.
    pub fn user_message(&self) -> String {
        match self {
            ShopError::Commerce(e) => e.to_string(),
            ShopError::Contended { .. } | ShopError::Db(DbError::VersionConflict { .. }) => {
                "The item is in high demand right now, please try again".to_string()
            }
            ShopError::Gateway(_) => "Payment could not be started, please try again".to_string(),
            ShopError::Compensated { refunded, .. } => format!(
                "Your order could not be placed. {refunded} has been credited to your wallet"
            ),
            ShopError::Db(_) | ShopError::Cache(_) | ShopError::Config(_) => {
                "Something went wrong, please try again".to_string()
            }
        }
    }
}

/// Result alias for shop services.
pub type ShopResult<T> = Result<T, ShopError>;

#[cfg(test)]
mod tests {
    use super::*;
    use turbo_commerce::{Currency, ProductId};

    #[test]
    fn test_kind_follows_domain_error() {
        let err: ShopError = CommerceError::StockConflict {
            product_id: ProductId::new("tee"),
            size: "M".into(),
            available: 2,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::StockConflict);

        let err = ShopError::Contended {
            operation: "add_item",
            attempts: 5,
        };
        assert_eq!(err.kind(), ErrorKind::StockConflict);
        assert!(err.user_message().contains("try again"));
    }

    #[test]
    fn test_conflict_detection() {
        let err: ShopError = DbError::VersionConflict {
            collection: "products".into(),
            key: "tee".into(),
            expected: 1,
            found: 2,
        }
        .into();
        assert!(err.is_conflict());

        let err: ShopError = CommerceError::EmptyCart.into();
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_compensated_message_names_amount() {
        let err = ShopError::Compensated {
            payment_id: "pay_1".into(),
            refunded: Money::from_major(700, Currency::INR),
            reason: "out of stock".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Payment);
        assert!(err.user_message().contains("700"));
    }
}

//! Customer wallet with a transaction ledger.

use crate::error::CommerceError;
use crate::ids::UserId;
use crate::money::{Currency, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletReason {
    /// Paid for an order.
    Purchase,
    /// Order or line cancelled.
    Cancellation,
    /// Return accepted.
    Return,
    /// Gateway payment whose order could not be committed.
    Compensation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub kind: TransactionKind,
    pub amount: Money,
    pub reason: WalletReason,
    /// Order display id or payment id.
    pub reference: String,
    pub at: DateTime<Utc>,
}

/// A customer's stored balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: Money,
    #[serde(default)]
    pub transactions: Vec<WalletTransaction>,
}

impl Wallet {
    /// An empty wallet.
    pub fn new(user_id: UserId, currency: Currency) -> Self {
        Self {
            user_id,
            balance: Money::zero(currency),
            transactions: Vec::new(),
        }
    }

    /// Add `amount` to the balance. Zero amounts are ignored.
    pub fn credit(
        &mut self,
        amount: Money,
        reason: WalletReason,
        reference: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), CommerceError> {
        if amount.is_zero() {
            return Ok(());
        }
        if amount.is_negative() {
            return Err(CommerceError::Validation(format!(
                "cannot credit a negative amount ({amount})"
            )));
        }
        self.balance = self.balance.checked_add(&amount).ok_or_else(|| {
            CommerceError::CurrencyMismatch {
                expected: self.balance.currency.code().to_string(),
                got: amount.currency.code().to_string(),
            }
        })?;
        self.push(TransactionKind::Credit, amount, reason, reference.into(), at);
        Ok(())
    }

    /// Take `amount` from the balance; fails if the balance is short.
    pub fn debit(
        &mut self,
        amount: Money,
        reason: WalletReason,
        reference: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), CommerceError> {
        if amount.currency != self.balance.currency {
            return Err(CommerceError::CurrencyMismatch {
                expected: self.balance.currency.code().to_string(),
                got: amount.currency.code().to_string(),
            });
        }
        if self.balance.amount_minor < amount.amount_minor {
            return Err(CommerceError::InsufficientBalance {
                required: amount,
                available: self.balance,
            });
        }
        self.balance = self
            .balance
            .checked_sub(&amount)
            .ok_or(CommerceError::Overflow)?;
        self.push(TransactionKind::Debit, amount, reason, reference.into(), at);
        Ok(())
    }

    fn push(
        &mut self,
        kind: TransactionKind,
        amount: Money,
        reason: WalletReason,
        reference: String,
        at: DateTime<Utc>,
    ) {
        self.transactions.push(WalletTransaction {
            kind,
            amount,
            reason,
            reference,
            at,
        });
    }
}

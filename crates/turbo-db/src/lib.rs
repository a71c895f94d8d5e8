//! Versioned document store for TurboCommerce.
//!
//! Documents are JSON values in named collections, stored in a redb
//! database file (or in memory for tests). Every document carries a version
//! that goes up by one on each write, and multi-document [`Transaction`]s
//! commit only if nothing they read has changed since.
//!
//! # Example
//!
//! ```rust
//! use turbo_db::Db;
//!
//! # async fn demo() -> Result<(), turbo_db::DbError> {
//! let db = Db::in_memory()?;
//! db.put("products", "tee", &serde_json::json!({ "reserved": 0 })).await?;
//!
//! let mut tx = db.begin();
//! let mut product: serde_json::Value = tx.require("products", "tee").await?;
//! product["reserved"] = 1.into();
//! tx.put("products", "tee", &product)?;
//! tx.put("carts", "user-1", &serde_json::json!({ "items": ["tee"] }))?;
//! tx.commit().await?; // fails with VersionConflict if "tee" changed meanwhile
//! # Ok(())
//! # }
//! ```

mod db;
mod error;
mod transaction;

pub use db::{Db, Document, Versioned};
pub use error::DbError;
pub use transaction::{CommitInfo, Transaction, SEQUENCES};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{Db, DbError, Transaction, Versioned};
}

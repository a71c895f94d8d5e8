//! Store error types.

use thiserror::Error;

/// Errors that can occur when using the store.
#[derive(Error, Debug)]
pub enum DbError {
    /// A document changed between read and commit.
    #[error("Version conflict on {collection}/{key}: read version {expected}, found {found}")]
    VersionConflict {
        collection: String,
        key: String,
        expected: u64,
        found: u64,
    },

    /// No document under the key when one was required.
    #[error("Document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    /// Failed to serialize or deserialize a document.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

impl DbError {
    /// True for optimistic-concurrency failures the caller may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::VersionConflict { .. })
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

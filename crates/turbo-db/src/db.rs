//! redb-backed document storage and single-document operations.
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `documents` | `(collection, key)` | JSON bytes | Live documents |
//! | `versions` | `(collection, key)` | `u64` | Version counter, kept after delete |
//!
//! Every write goes through one redb write transaction that checks and bumps
//! the version row, so version checks and the data they guard commit
//! together. redb allows a single writer at a time, which makes that write
//! transaction the store's commit lock.

use crate::{DbError, Transaction};
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub(crate) type DocKey = (&'static str, &'static str);

/// Live documents: key = (collection, key), value = JSON-serialized data.
pub(crate) const DOCUMENTS: TableDefinition<DocKey, &[u8]> = TableDefinition::new("documents");

/// Version counters: key = (collection, key), value = last written version.
/// A delete bumps the counter and leaves the row behind as a tombstone.
pub(crate) const VERSIONS: TableDefinition<DocKey, u64> = TableDefinition::new("versions");

/// A stored document: JSON data plus its version.
///
/// Versions start at 1 and go up by one on every write or delete. A document
/// that never existed reads as version 0; a deleted one keeps the version of
/// its delete, so a reader holding an older version still conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u64,
    pub data: serde_json::Value,
}

/// A typed document with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub data: T,
}

impl<T> Versioned<T> {
    /// Drop the version.
    pub fn into_inner(self) -> T {
        self.data
    }
}

pub(crate) fn decode<T: DeserializeOwned>(doc: Document) -> Result<Versioned<T>, DbError> {
    Ok(Versioned {
        version: doc.version,
        data: serde_json::from_value(doc.data)?,
    })
}

/// Document store backed by redb.
///
/// Cheap to clone; clones share the same database. Documents live in named
/// collections under string keys.
#[derive(Clone)]
pub struct Db {
    pub(crate) store: Arc<Database>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}

impl Db {
    /// Open or create the database file at `path`.
    ///
    /// redb holds an exclusive lock on the file, so a second process (or a
    /// second `open` in this one) fails instead of writing over this store.
    /// Commits use redb's default `Durability::Immediate` and are on disk
    /// when they return.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        let database = Database::create(path)?;
        tracing::debug!(path = %path.display(), "Opened store");
        Self::init(database)
    }

    /// Create an empty store that lives in memory only.
    pub fn in_memory() -> Result<Self, DbError> {
        let database = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(database)
    }

    fn init(database: Database) -> Result<Self, DbError> {
        let txn = database.begin_write()?;
        {
            let _ = txn.open_table(DOCUMENTS)?;
            let _ = txn.open_table(VERSIONS)?;
        }
        txn.commit()?;
        Ok(Self {
            store: Arc::new(database),
        })
    }

    /// Start an optimistic transaction.
    pub fn begin(&self) -> Transaction {
        Transaction::new(self.clone())
    }

    /// Version and raw data of one document, in a fresh read transaction.
    pub(crate) fn load(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<(u64, Option<serde_json::Value>), DbError> {
        let read_txn = self.store.begin_read()?;
        let versions = read_txn.open_table(VERSIONS)?;
        let docs = read_txn.open_table(DOCUMENTS)?;

        let version = versions
            .get((collection, key))?
            .map(|g| g.value())
            .unwrap_or(0);
        let data = match docs.get((collection, key))? {
            Some(guard) => Some(serde_json::from_slice(guard.value())?),
            None => None,
        };
        Ok((version, data))
    }

    /// Read one document.
    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Versioned<T>>, DbError> {
        let (version, data) = self.load(collection, key)?;
        data.map(|data| decode(Document { version, data })).transpose()
    }

    /// Current version of a document (0 if it never existed).
    pub async fn version(&self, collection: &str, key: &str) -> Result<u64, DbError> {
        Ok(self.load(collection, key)?.0)
    }

    /// Read every document in a collection, ordered by key.
    pub async fn scan<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, Versioned<T>)>, DbError> {
        let read_txn = self.store.begin_read()?;
        let docs = read_txn.open_table(DOCUMENTS)?;
        let versions = read_txn.open_table(VERSIONS)?;

        let mut out = Vec::new();
        for result in docs.range((collection, "")..)? {
            let (doc_key, value) = result?;
            let (owner, key) = doc_key.value();
            if owner != collection {
                break;
            }
            let version = versions
                .get((owner, key))?
                .map(|g| g.value())
                .unwrap_or(0);
            let data = serde_json::from_slice(value.value())?;
            out.push((key.to_string(), decode(Document { version, data })?));
        }
        Ok(out)
    }

    /// Keys in a collection, ordered.
    pub async fn keys(&self, collection: &str) -> Result<Vec<String>, DbError> {
        let read_txn = self.store.begin_read()?;
        let docs = read_txn.open_table(DOCUMENTS)?;

        let mut keys = Vec::new();
        for result in docs.range((collection, "")..)? {
            let (doc_key, _) = result?;
            let (owner, key) = doc_key.value();
            if owner != collection {
                break;
            }
            keys.push(key.to_string());
        }
        Ok(keys)
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> Result<usize, DbError> {
        Ok(self.keys(collection).await?.len())
    }

    /// Write a document unconditionally. Returns the new version.
    pub async fn put<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        value: &T,
    ) -> Result<u64, DbError> {
        let bytes = serde_json::to_vec(value)?;
        self.write(|tables| tables.put(collection, key, &bytes))
    }

    /// Compare-and-swap: write only if the stored version is still
    /// `expected` (0 means "never existed"). Returns the new version.
    pub async fn put_if_version<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        expected: u64,
        value: &T,
    ) -> Result<u64, DbError> {
        let bytes = serde_json::to_vec(value)?;
        self.write(|tables| {
            tables.check(collection, key, expected)?;
            tables.put(collection, key, &bytes)
        })
    }

    /// Remove a document, keeping its version as a tombstone. Returns whether
    /// it existed.
    pub async fn delete(&self, collection: &str, key: &str) -> Result<bool, DbError> {
        self.write(|tables| tables.delete(collection, key))
    }

    /// Run `apply` in one redb write transaction. Commits on `Ok`, aborts on
    /// `Err`.
    pub(crate) fn write<R>(
        &self,
        apply: impl FnOnce(&mut WriteTables<'_>) -> Result<R, DbError>,
    ) -> Result<R, DbError> {
        let txn = self.store.begin_write()?;
        let outcome = WriteTables::open(&txn).and_then(|mut tables| apply(&mut tables));
        match outcome {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort()?;
                Err(err)
            }
        }
    }
}

/// Both tables opened inside one write transaction.
pub(crate) struct WriteTables<'txn> {
    docs: Table<'txn, DocKey, &'static [u8]>,
    versions: Table<'txn, DocKey, u64>,
}

impl<'txn> WriteTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> Result<Self, DbError> {
        Ok(Self {
            docs: txn.open_table(DOCUMENTS)?,
            versions: txn.open_table(VERSIONS)?,
        })
    }

    pub(crate) fn version(&self, collection: &str, key: &str) -> Result<u64, DbError> {
        Ok(self
            .versions
            .get((collection, key))?
            .map(|g| g.value())
            .unwrap_or(0))
    }

    /// Fail with `VersionConflict` unless the stored version is `expected`.
    pub(crate) fn check(&self, collection: &str, key: &str, expected: u64) -> Result<(), DbError> {
        let found = self.version(collection, key)?;
        if found != expected {
            return Err(DbError::VersionConflict {
                collection: collection.to_string(),
                key: key.to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }

    fn bump(&mut self, collection: &str, key: &str) -> Result<u64, DbError> {
        let next = self.version(collection, key)? + 1;
        self.versions.insert((collection, key), next)?;
        Ok(next)
    }

    pub(crate) fn put(
        &mut self,
        collection: &str,
        key: &str,
        bytes: &[u8],
    ) -> Result<u64, DbError> {
        let version = self.bump(collection, key)?;
        self.docs.insert((collection, key), bytes)?;
        Ok(version)
    }

    pub(crate) fn delete(&mut self, collection: &str, key: &str) -> Result<bool, DbError> {
        let existed = self.docs.remove((collection, key))?.is_some();
        if existed {
            self.bump(collection, key)?;
        }
        Ok(existed)
    }
}

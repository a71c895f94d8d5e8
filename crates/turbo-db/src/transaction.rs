//! Optimistic multi-document transactions.
//!
//! A transaction remembers the version of every document it reads and
//! stages its writes locally. [`Transaction::commit`] opens a redb write
//! transaction, checks that none of the read documents changed, then applies
//! all staged writes before committing it. If any read is stale the redb
//! transaction is aborted, the commit fails with [`DbError::VersionConflict`]
//! and nothing is written.

use crate::db::Db;
use crate::DbError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Collection holding named counters for [`Transaction::next_sequence`].
pub const SEQUENCES: &str = "_sequences";

type DocKey = (String, String);

#[derive(Debug, Clone)]
enum Staged {
    Put(serde_json::Value),
    Delete,
}

/// Summary of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Documents read and validated.
    pub reads: usize,
    /// Documents written or deleted.
    pub writes: usize,
}

/// An open transaction. Dropping it without committing discards it.
#[derive(Debug)]
pub struct Transaction {
    db: Db,
    reads: HashMap<DocKey, (u64, Option<serde_json::Value>)>,
    writes: BTreeMap<DocKey, Staged>,
}

fn doc_key(collection: &str, key: &str) -> DocKey {
    (collection.to_string(), key.to_string())
}

impl Transaction {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            db,
            reads: HashMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Read a document, seeing this transaction's own staged writes.
    ///
    /// The first read of a key pins its version; later reads of the same key
    /// return the pinned data.
    pub async fn get<T: DeserializeOwned>(
        &mut self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>, DbError> {
        let id = doc_key(collection, key);
        if let Some(staged) = self.writes.get(&id) {
            return match staged {
                Staged::Put(value) => Ok(Some(serde_json::from_value(value.clone())?)),
                Staged::Delete => Ok(None),
            };
        }

        if !self.reads.contains_key(&id) {
            let entry = self.db.load(collection, key)?;
            self.reads.insert(id.clone(), entry);
        }

        match self.reads.get(&id) {
            Some((_, Some(value))) => Ok(Some(serde_json::from_value(value.clone())?)),
            _ => Ok(None),
        }
    }

    /// Read a document that must exist.
    pub async fn require<T: DeserializeOwned>(
        &mut self,
        collection: &str,
        key: &str,
    ) -> Result<T, DbError> {
        self.get(collection, key)
            .await?
            .ok_or_else(|| DbError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            })
    }

    /// Version pinned by an earlier read (0 if not read or never written).
    pub fn read_version(&self, collection: &str, key: &str) -> u64 {
        self.reads
            .get(&doc_key(collection, key))
            .map(|(v, _)| *v)
            .unwrap_or(0)
    }

    /// Stage a write.
    pub fn put<T: Serialize>(
        &mut self,
        collection: &str,
        key: &str,
        value: &T,
    ) -> Result<(), DbError> {
        let value = serde_json::to_value(value)?;
        self.writes
            .insert(doc_key(collection, key), Staged::Put(value));
        Ok(())
    }

    /// Stage a delete.
    pub fn delete(&mut self, collection: &str, key: &str) {
        self.writes.insert(doc_key(collection, key), Staged::Delete);
    }

    /// Take the next value of a named counter (first value is 1).
    ///
    /// The counter is an ordinary document, so two transactions drawing from
    /// the same counter conflict and only one commits.
    pub async fn next_sequence(&mut self, name: &str) -> Result<u64, DbError> {
        let current: u64 = self.get(SEQUENCES, name).await?.unwrap_or(0);
        let next = current + 1;
        self.put(SEQUENCES, name, &next)?;
        Ok(next)
    }

    /// True if nothing has been staged.
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Validate reads and apply writes atomically.
    pub async fn commit(self) -> Result<CommitInfo, DbError> {
        let Transaction { db, reads, writes } = self;
        let info = CommitInfo {
            reads: reads.len(),
            writes: writes.len(),
        };
        let mut staged = Vec::with_capacity(writes.len());
        for (id, write) in writes {
            let bytes = match write {
                Staged::Put(value) => Some(serde_json::to_vec(&value)?),
                Staged::Delete => None,
            };
            staged.push((id, bytes));
        }

        db.write(|tables| {
            for ((collection, key), (expected, _)) in &reads {
                if let Err(err) = tables.check(collection, key, *expected) {
                    tracing::debug!(
                        collection = %collection,
                        key = %key,
                        expected,
                        "Transaction read is stale"
                    );
                    return Err(err);
                }
            }
            for ((collection, key), bytes) in &staged {
                match bytes {
                    Some(bytes) => {
                        tables.put(collection, key, bytes)?;
                    }
                    None => {
                        tables.delete(collection, key)?;
                    }
                }
            }
            Ok(())
        })?;

        Ok(info)
    }
}

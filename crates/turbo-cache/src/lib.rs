//! In-process key-value cache for TurboCommerce.
//!
//! Values are stored as JSON with an optional time-to-live. The cache is a
//! read-side mirror: the store stays the source of truth and writers delete
//! the affected keys after every change.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use turbo_cache::{cache_key, Cache};
//!
//! let cache = Cache::new(Duration::from_secs(60));
//! let key = cache_key!("cart", "user-1");
//!
//! cache.set(&key, &vec![1, 2, 3]).unwrap();
//! let items: Option<Vec<i32>> = cache.get(&key).unwrap();
//! assert_eq!(items, Some(vec![1, 2, 3]));
//!
//! cache.delete(&key);
//! assert!(!cache.exists(&key));
//! ```

mod error;
mod kv;

pub use error::CacheError;
pub use kv::Cache;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{cache_key, Cache, CacheError};
}

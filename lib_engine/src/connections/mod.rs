//! # Reading Stores
//!
//! Persistence backends for acquired readings. The engine treats storage as
//! strictly best-effort: a backend that cannot open degrades acquisition to
//! memory-only operation, and a failed write is logged and dropped, never
//! surfaced to packet consumers.

pub mod store_file;
pub mod store_redis;

use std::future::Future;

use thiserror::Error;

use crate::readings::Reading;

pub use store_file::FileReadingStore;
pub use store_redis::RedisReadingStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store used before open() succeeded")]
    NotOpen,
}

/// Keyed persistence for readings.
///
/// Implementations are keyed by `Reading::timestamp`: writing a reading with
/// an existing timestamp overwrites it. `get_all` makes no ordering promise;
/// callers sort.
pub trait ReadingStore {
    /// Prepares the backend for reads and writes. Idempotent.
    fn open(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Inserts or overwrites one reading.
    fn put(&mut self, reading: &Reading) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Returns every persisted reading.
    fn get_all(&mut self) -> impl Future<Output = Result<Vec<Reading>, StoreError>> + Send;
}

/// Runtime backend selection for binaries that pick a store from config.
#[derive(Clone)]
pub enum StoreBackend {
    File(FileReadingStore),
    Redis(RedisReadingStore),
}

impl ReadingStore for StoreBackend {
    async fn open(&mut self) -> Result<(), StoreError> {
        match self {
            StoreBackend::File(store) => store.open().await,
            StoreBackend::Redis(store) => store.open().await,
        }
    }

    async fn put(&mut self, reading: &Reading) -> Result<(), StoreError> {
        match self {
            StoreBackend::File(store) => store.put(reading).await,
            StoreBackend::Redis(store) => store.put(reading).await,
        }
    }

    async fn get_all(&mut self) -> Result<Vec<Reading>, StoreError> {
        match self {
            StoreBackend::File(store) => store.get_all().await,
            StoreBackend::Redis(store) => store.get_all().await,
        }
    }
}

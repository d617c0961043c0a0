//! # Redis-Backed Reading Store
//!
//! Readings live in a single hash keyed by timestamp, values JSON-encoded.
//! Suited to deployments where several services share one acquisition
//! history; reconnection is delegated to the driver's connection manager.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::connections::{ReadingStore, StoreError};
use crate::readings::Reading;

/// Hash holding all persisted readings.
const READINGS_KEY: &str = "aqstream:readings";

#[derive(Clone)]
pub struct RedisReadingStore {
    client: redis::Client,
    conn: Option<ConnectionManager>,
}

impl RedisReadingStore {
    /// Validates the URL; no connection is attempted until `open`.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        Ok(Self { client, conn: None })
    }
}

impl ReadingStore for RedisReadingStore {
    async fn open(&mut self) -> Result<(), StoreError> {
        let conn = ConnectionManager::new(self.client.clone()).await?;
        self.conn = Some(conn);
        Ok(())
    }

    async fn put(&mut self, reading: &Reading) -> Result<(), StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::NotOpen)?;
        let value = serde_json::to_string(reading)?;
        let _: () = conn.hset(READINGS_KEY, reading.timestamp, value).await?;
        Ok(())
    }

    async fn get_all(&mut self) -> Result<Vec<Reading>, StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::NotOpen)?;
        let raw: Vec<(String, String)> = conn.hgetall(READINGS_KEY).await?;
        let mut readings = Vec::with_capacity(raw.len());
        for (field, value) in raw {
            match serde_json::from_str::<Reading>(&value) {
                Ok(reading) => readings.push(reading),
                Err(e) => log::warn!("skipping unreadable reading at hash field {field}: {e}"),
            }
        }
        Ok(readings)
    }
}

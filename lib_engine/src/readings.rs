//! # Sensor Readings & Rolling History
//!
//! ## Overview
//! Canonical data model for everything the engine moves around: a [`Reading`]
//! keyed by its millisecond timestamp, the normalization applied to raw feed
//! payloads, and the bounded history window the forecaster samples from.
//!
//! ## Key Behaviors
//! - Normalization accepts both canonical and legacy hardware field names.
//! - Payloads that are not JSON objects are rejected outright; the caller is
//!   expected to drop them.
//! - The history window evicts oldest-first once full, so the forecaster
//!   always sees the most recent [`HISTORY_CAPACITY`] samples.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of AQI samples retained for forecasting.
pub const HISTORY_CAPACITY: usize = 50;

/// A single air-quality measurement.
///
/// `timestamp` is milliseconds since the Unix epoch and doubles as the
/// identity of the reading in persistence: writing a second reading with the
/// same timestamp overwrites the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: i64,
    pub sensor_ppm: f64,
    pub normalized_aqi: f64,
}

/// Current wall clock in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Maps a raw feed payload onto a [`Reading`].
///
/// Hardware revisions disagree on field names, so both spellings of each
/// value are accepted: `sensor_ppm`/`mq135_ppm` and `normalized_aqi`/`aqi`,
/// canonical name winning when both are present. A missing or zero timestamp
/// is replaced with the arrival time, missing or non-numeric measurements
/// become `0.0`, and negative measurements are clamped to zero. Payloads
/// that are not JSON objects yield `None`.
pub fn normalize_payload(raw: &Value) -> Option<Reading> {
    let obj = raw.as_object()?;

    let timestamp = match obj.get("timestamp").and_then(Value::as_i64) {
        Some(ts) if ts != 0 => ts,
        _ => now_ms(),
    };
    let sensor_ppm = obj
        .get("sensor_ppm")
        .or_else(|| obj.get("mq135_ppm"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .max(0.0);
    let normalized_aqi = obj
        .get("normalized_aqi")
        .or_else(|| obj.get("aqi"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .max(0.0);

    Some(Reading {
        timestamp,
        sensor_ppm,
        normalized_aqi,
    })
}

/// Bounded FIFO of recent normalized AQI values, oldest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    values: Vec<f64>,
}

impl HistoryWindow {
    pub fn new() -> Self {
        Self {
            values: Vec::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Appends a sample, evicting the oldest when the window is full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == HISTORY_CAPACITY {
            self.values.remove(0);
        }
        self.values.push(value);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

//! # Live Sensor Feed Ingestor
//!
//! ## Overview
//! Maintains a WebSocket connection to the sensor bridge and publishes the
//! most recent normalized reading into a watch cell. The engine reads the
//! cell without consuming it, so a stalled feed simply keeps serving the
//! last reading received.
//!
//! ## Key Behaviors
//! - Reconnects forever with a fixed delay; a dead bridge never takes the
//!   engine down.
//! - Malformed frames are logged and dropped; the cell keeps its previous
//!   value.
//! - Shutdown is signalled over a broadcast channel, checked both between
//!   connection attempts and inside the read loop.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};

use crate::readings::{normalize_payload, Reading};

#[derive(Debug, Clone)]
pub struct LiveFeedConfig {
    /// WebSocket URL of the sensor bridge.
    pub url: String,
    /// Pause between reconnection attempts.
    pub reconnect_delay: Duration,
}

impl Default for LiveFeedConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9101/feed".to_string(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Creates the shared cell the ingestor writes and the engine reads.
pub fn live_cell() -> (watch::Sender<Option<Reading>>, watch::Receiver<Option<Reading>>) {
    watch::channel(None)
}

pub struct LiveWsIngestor {
    config: LiveFeedConfig,
    cell: watch::Sender<Option<Reading>>,
}

impl LiveWsIngestor {
    pub fn new(config: LiveFeedConfig, cell: watch::Sender<Option<Reading>>) -> Self {
        Self { config, cell }
    }

    /// Connects, reads frames and reconnects until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            if shutdown.try_recv().is_ok() {
                break;
            }

            log::info!("Connecting to sensor feed: {}", self.config.url);

            match connect_async(self.config.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    log::info!("Connected to sensor feed");
                    let (_write, mut read) = ws_stream.split();

                    loop {
                        tokio::select! {
                            _ = shutdown.recv() => {
                                log::info!("Live ingestor shutting down...");
                                return;
                            }
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(WsMessage::Text(text))) => self.handle_frame(text.as_str()),
                                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                                    Some(Ok(WsMessage::Close(_))) => {
                                        log::warn!("Sensor feed closed the connection");
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(e)) => {
                                        log::error!("Sensor feed error: {e}");
                                        break;
                                    }
                                    None => {
                                        log::warn!("Sensor feed stream ended");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    log::error!("Failed to connect to sensor feed: {e}");
                }
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("Live ingestor shutting down...");
                    return;
                }
                _ = sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// Normalizes one text frame into the live cell. Frames that fail to
    /// parse, or parse to something other than an object, are dropped.
    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => match normalize_payload(&value) {
                Some(reading) => {
                    log::trace!("Live reading at {}", reading.timestamp);
                    let _ = self.cell.send(Some(reading));
                }
                None => log::warn!("Dropping non-object frame from sensor feed"),
            },
            Err(e) => log::warn!("Dropping malformed frame from sensor feed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_land_in_the_live_cell() {
        let (tx, rx) = live_cell();
        let ingestor = LiveWsIngestor::new(LiveFeedConfig::default(), tx);
        ingestor.handle_frame(r#"{"timestamp": 123, "mq135_ppm": 9.0, "aqi": 6.0}"#);
        let reading = rx.borrow().clone().unwrap();
        assert_eq!(reading.timestamp, 123);
        assert!((reading.sensor_ppm - 9.0).abs() < f64::EPSILON);
        assert!((reading.normalized_aqi - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_frames_leave_the_cell_untouched() {
        let (tx, rx) = live_cell();
        let ingestor = LiveWsIngestor::new(LiveFeedConfig::default(), tx);
        ingestor.handle_frame("not json at all");
        ingestor.handle_frame("[1, 2, 3]");
        assert!(rx.borrow().is_none());

        ingestor.handle_frame(r#"{"timestamp": 5, "aqi": 1.0}"#);
        ingestor.handle_frame("still not json");
        let held = rx.borrow().clone().unwrap();
        assert_eq!(held.timestamp, 5);
    }

    #[test]
    fn repeated_reads_see_the_same_reading() {
        let (tx, rx) = live_cell();
        let ingestor = LiveWsIngestor::new(LiveFeedConfig::default(), tx);
        ingestor.handle_frame(r#"{"timestamp": 77, "sensor_ppm": 3.0, "normalized_aqi": 2.0}"#);
        let first = rx.borrow().clone();
        let second = rx.borrow().clone();
        assert_eq!(first, second);
        assert_eq!(first.unwrap().timestamp, 77);
    }
}

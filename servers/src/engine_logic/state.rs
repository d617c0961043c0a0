use crate::engine_logic::model::ServerMessage;
use lib_engine::core::engine::AcquisitionMode;
use lib_engine::forecast::ForecastStatus;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};

// Result type for acknowledgements
pub type AckResult = Result<(), String>;

// Struct to wrap a mode change and a one-time channel for the response
pub struct ModeRequest {
    pub mode: AcquisitionMode,
    pub responder: oneshot::Sender<AckResult>,
}

#[derive(Clone)]
pub struct AppState {
    // Channel to send mode changes to the ticker task
    mode_tx: Arc<Mutex<Option<mpsc::UnboundedSender<ModeRequest>>>>,
    // Mode currently applied by the ticker, for health checks and greetings
    current_mode: Arc<Mutex<AcquisitionMode>>,
    // Channel to broadcast frames (readings, forecasts, mode changes) to all clients
    pub frame_tx: broadcast::Sender<Arc<ServerMessage>>,
    // Latest history window snapshot, published by the ticker for the forecaster
    history_tx: Arc<watch::Sender<Vec<f64>>>,
    pub history_rx: watch::Receiver<Vec<f64>>,
    // Forecaster health, published after every prediction round
    forecast_status_tx: Arc<watch::Sender<ForecastStatus>>,
    pub forecast_status_rx: watch::Receiver<ForecastStatus>,
}

impl AppState {
    pub fn new() -> Self {
        let (frame_tx, _) = broadcast::channel(1000); // Buffer size 1000
        let (history_tx, history_rx) = watch::channel(Vec::new());
        let (forecast_status_tx, forecast_status_rx) = watch::channel(ForecastStatus::Active);
        Self {
            mode_tx: Arc::new(Mutex::new(None)),
            current_mode: Arc::new(Mutex::new(AcquisitionMode::default())),
            frame_tx,
            history_tx: Arc::new(history_tx),
            history_rx,
            forecast_status_tx: Arc::new(forecast_status_tx),
            forecast_status_rx,
        }
    }

    pub async fn set_mode_tx(&self, tx: mpsc::UnboundedSender<ModeRequest>) {
        let mut guard = self.mode_tx.lock().await;
        *guard = Some(tx);
    }

    /// Asks the ticker to switch acquisition mode and waits for the ack.
    pub async fn request_mode(&self, mode: AcquisitionMode) -> AckResult {
        let (tx, rx) = oneshot::channel();
        let request = ModeRequest {
            mode,
            responder: tx,
        };

        {
            let guard = self.mode_tx.lock().await;
            if let Some(tx_chan) = &*guard {
                if tx_chan.send(request).is_err() {
                    return Err("Failed to send mode change to the engine.".to_string());
                }
            } else {
                return Err("Engine not available.".to_string());
            }
        }

        // Wait for the response from the ticker task
        rx.await
            .unwrap_or_else(|_| Err("No response from the engine.".to_string()))
    }

    pub async fn current_mode(&self) -> AcquisitionMode {
        *self.current_mode.lock().await
    }

    pub async fn set_current_mode(&self, mode: AcquisitionMode) {
        let mut guard = self.current_mode.lock().await;
        *guard = mode;
    }

    /// Publishes the latest history window for the forecaster.
    pub fn publish_history(&self, history: Vec<f64>) {
        let _ = self.history_tx.send(history);
    }

    /// Publishes the forecaster's predictor health for the health endpoint.
    pub fn publish_forecast_status(&self, status: ForecastStatus) {
        let _ = self.forecast_status_tx.send(status);
    }

    pub fn forecast_status(&self) -> ForecastStatus {
        *self.forecast_status_rx.borrow()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_mode_without_engine_is_refused() {
        let state = AppState::new();
        let result = state.request_mode(AcquisitionMode::Live).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn request_mode_round_trips_through_the_channel() {
        let state = AppState::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<ModeRequest>();
        state.set_mode_tx(tx).await;

        let responder = tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            assert_eq!(request.mode, AcquisitionMode::Replay);
            request.responder.send(Ok(())).unwrap();
        });

        let result = state.request_mode(AcquisitionMode::Replay).await;
        assert!(result.is_ok());
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn history_snapshots_reach_subscribers() {
        let state = AppState::new();
        let mut rx = state.history_rx.clone();
        state.publish_history(vec![1.0, 2.0, 3.0]);
        assert_eq!(*rx.borrow_and_update(), vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn forecast_status_starts_active_and_tracks_updates() {
        let state = AppState::new();
        assert_eq!(state.forecast_status(), ForecastStatus::Active);
        state.publish_forecast_status(ForecastStatus::Degraded);
        assert_eq!(state.forecast_status(), ForecastStatus::Degraded);
    }
}

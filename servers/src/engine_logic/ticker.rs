use crate::engine_logic::config::Config;
use crate::engine_logic::model::ServerMessage;
use crate::engine_logic::state::{AppState, ModeRequest};
use lib_engine::connections::{FileReadingStore, RedisReadingStore, StoreBackend};
use lib_engine::core::engine::DataEngine;
use lib_engine::core::synthetic::SyntheticGenerator;
use lib_engine::readings::{HistoryWindow, Reading};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::interval;

/// Builds the store selected in config. `None` disables persistence, either
/// on request or because the backend could not be constructed.
fn build_store(config: &Config) -> Option<StoreBackend> {
    match config.store_backend().as_str() {
        "file" => Some(StoreBackend::File(FileReadingStore::new(config.data_dir()))),
        "redis" => match RedisReadingStore::new(&config.redis_url()) {
            Ok(store) => Some(StoreBackend::Redis(store)),
            Err(e) => {
                log::error!("Invalid redis store configuration: {e}");
                None
            }
        },
        "none" => None,
        other => {
            log::warn!("Unknown store backend '{other}', running without persistence");
            None
        }
    }
}

/// Owns the acquisition engine: produces one packet per tick, applies mode
/// changes requested by clients and publishes history snapshots for the
/// forecaster.
pub async fn run(
    config: Config,
    app_state: AppState,
    live_rx: watch::Receiver<Option<Reading>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (mode_tx, mut mode_rx) = mpsc::unbounded_channel::<ModeRequest>();
    app_state.set_mode_tx(mode_tx).await;

    let store = build_store(&config);
    let synth = SyntheticGenerator::new(config.rng_seed());
    let mut engine = DataEngine::new(store, live_rx, synth).await;
    let mut history = HistoryWindow::new();
    let mut tick = interval(config.tick_interval());

    log::info!(
        "Ticker started in {} mode (persistence: {})",
        engine.mode(),
        if engine.store_available() { "on" } else { "off" }
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Ticker received shutdown signal.");
                break;
            }
            Some(request) = mode_rx.recv() => {
                engine.set_mode(request.mode);
                app_state.set_current_mode(request.mode).await;
                let _ = request.responder.send(Ok(()));
                let _ = app_state
                    .frame_tx
                    .send(Arc::new(ServerMessage::mode_changed(&request.mode.to_string())));
                log::info!("Acquisition mode set to {}", request.mode);
            }
            _ = tick.tick() => {
                let packet = engine.get_packet();
                history.push(packet.normalized_aqi);
                app_state.publish_history(history.as_slice().to_vec());
                let _ = app_state.frame_tx.send(Arc::new(ServerMessage::reading(packet)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_engine::core::engine::AcquisitionMode;
    use lib_engine::ingestors::live_ws::live_cell;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            store_backend: Some("none".to_string()),
            tick_interval_ms: Some(10),
            rng_seed: Some(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn emits_reading_frames_and_acks_mode_changes() {
        let state = AppState::new();
        let (shutdown_tx, _) = broadcast::channel(1);
        let (_cell_tx, cell_rx) = live_cell();
        let mut frame_rx = state.frame_tx.subscribe();

        let handle = tokio::spawn(run(
            test_config(),
            state.clone(),
            cell_rx,
            shutdown_tx.subscribe(),
        ));

        // first frame is an acquired reading
        let frame = tokio::time::timeout(Duration::from_secs(5), frame_rx.recv())
            .await
            .expect("no frame within deadline")
            .unwrap();
        assert_eq!(frame.r#type, "reading");
        assert!(frame.reading.is_some());

        // mode changes are acked and observable
        let ack = tokio::time::timeout(
            Duration::from_secs(5),
            state.request_mode(AcquisitionMode::Simulation),
        )
        .await
        .expect("no ack within deadline");
        assert!(ack.is_ok());
        assert_eq!(state.current_mode().await, AcquisitionMode::Simulation);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn history_snapshots_follow_packets() {
        let state = AppState::new();
        let (shutdown_tx, _) = broadcast::channel(1);
        let (_cell_tx, cell_rx) = live_cell();
        let mut history_rx = state.history_rx.clone();

        let handle = tokio::spawn(run(
            test_config(),
            state.clone(),
            cell_rx,
            shutdown_tx.subscribe(),
        ));

        tokio::time::timeout(Duration::from_secs(5), history_rx.changed())
            .await
            .expect("no history within deadline")
            .unwrap();
        assert!(!history_rx.borrow().is_empty());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}

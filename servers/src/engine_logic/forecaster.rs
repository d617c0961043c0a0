use crate::engine_logic::config::Config;
use crate::engine_logic::model::ServerMessage;
use crate::engine_logic::state::AppState;
use lib_engine::forecast::{ForecastEngine, HttpSequencePredictor};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::time::interval;

/// History used for the startup self-check, long enough to exercise the
/// momentum path.
const WARMUP_HISTORY: [f64; 5] = [100.0, 102.0, 105.0, 108.0, 110.0];

/// Runs forecasts on its own cadence so a slow external predictor can never
/// hold up packet acquisition.
pub async fn run(config: Config, app_state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let mut engine: ForecastEngine = ForecastEngine::new(config.rng_seed());
    if let Some(url) = config.predictor_url() {
        match HttpSequencePredictor::new(&url, config.predictor_timeout()) {
            Ok(predictor) => {
                engine = engine.with_predictor(predictor);
                log::info!("External predictor attached: {url}");
            }
            Err(e) => log::error!("Failed to build external predictor, heuristic only: {e}"),
        }
    }

    // Startup self-check; also warms up the predictor connection.
    let started = Instant::now();
    let warmup = engine.predict(&WARMUP_HISTORY).await;
    log::info!(
        "Forecast warm-up took {:?} (confidence {:.2})",
        started.elapsed(),
        warmup.confidence
    );
    app_state.publish_forecast_status(engine.status());

    let mut tick = interval(config.forecast_interval());
    let mut history_rx = app_state.history_rx.clone();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Forecaster received shutdown signal.");
                break;
            }
            _ = tick.tick() => {
                let history = history_rx.borrow_and_update().clone();
                if history.is_empty() {
                    continue;
                }
                let started = Instant::now();
                let prediction = engine.predict(&history).await;
                log::debug!(
                    "Forecast in {:?} (status {}, confidence {:.2})",
                    started.elapsed(),
                    engine.status(),
                    prediction.confidence
                );
                app_state.publish_forecast_status(engine.status());
                let _ = app_state.frame_tx.send(Arc::new(ServerMessage::forecast(prediction)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn publishes_forecast_frames_from_history() {
        let config = Config {
            forecast_interval_ms: Some(10),
            rng_seed: Some(1),
            ..Default::default()
        };
        let state = AppState::new();
        let (shutdown_tx, _) = broadcast::channel(1);
        state.publish_history(vec![100.0, 102.0, 105.0, 108.0, 110.0]);
        let mut frame_rx = state.frame_tx.subscribe();

        let handle = tokio::spawn(run(config, state.clone(), shutdown_tx.subscribe()));

        let frame = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let frame = frame_rx.recv().await.unwrap();
                if frame.r#type == "forecast" {
                    break frame;
                }
            }
        })
        .await
        .expect("no forecast within deadline");

        let forecast = frame.forecast.as_ref().unwrap();
        assert_eq!(forecast.current, 110.0);
        assert_eq!(forecast.prediction_curve.len(), 5);
        assert!((0.0..=1.0).contains(&forecast.confidence));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}

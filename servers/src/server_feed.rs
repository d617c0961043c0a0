//! Synthetic sensor bridge for development and demos: serves an endless
//! stream of generated readings over WebSocket, in the same wire shapes a
//! hardware bridge would produce. Every few frames it deliberately uses the
//! legacy field names so consumers keep their normalization honest.

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::StreamExt;
use lib_engine::core::synthetic::SyntheticGenerator;
use lib_engine::loggers::logfile::setup_logging;
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::time::interval;

/// Every n-th frame goes out with legacy field names.
const LEGACY_EVERY: u64 = 7;

#[derive(Clone)]
struct FeedState {
    frame_interval: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging(Path::new("./logs"), "info", "server_feed")?;

    let port = env::args()
        .nth(1)
        .unwrap_or_else(|| "9101".to_string())
        .parse::<u16>()
        .expect("Port must be a number");
    let frame_interval_ms = env::args()
        .nth(2)
        .unwrap_or_else(|| "1000".to_string())
        .parse::<u64>()
        .expect("Frame interval must be a number of milliseconds");

    let state = FeedState {
        frame_interval: Duration::from_millis(frame_interval_ms),
    };

    let app = Router::new()
        .route("/feed", get(feed_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    log::info!("Sensor feed emulator listening on {addr} (one frame per {frame_interval_ms}ms)");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            log::info!("Feed emulator shutting down.");
        })
        .await?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "OK")
}

async fn feed_handler(ws: WebSocketUpgrade, State(state): State<FeedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_readings(socket, state))
}

async fn stream_readings(mut socket: WebSocket, state: FeedState) {
    log::info!("Feed client connected");
    let mut synth = SyntheticGenerator::new(None);
    let mut tick = interval(state.frame_interval);
    let mut frame_count: u64 = 0;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                frame_count += 1;
                let reading = synth.generate();
                let payload = if frame_count % LEGACY_EVERY == 0 {
                    // older bridge firmware spelling
                    serde_json::json!({
                        "timestamp": reading.timestamp,
                        "mq135_ppm": reading.sensor_ppm,
                        "aqi": reading.normalized_aqi,
                    })
                    .to_string()
                } else {
                    match serde_json::to_string(&reading) {
                        Ok(json_str) => json_str,
                        Err(e) => {
                            log::error!("Failed to encode reading: {e}");
                            continue;
                        }
                    }
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // the feed is one-way; anything else is ignored
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    log::info!("Feed client disconnected");
}

use crate::engine_logic::config::Config;
use crate::engine_logic::model::{ClientMessage, ServerMessage};
use crate::engine_logic::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use lib_engine::core::engine::AcquisitionMode;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

pub async fn run(config: Config, app_state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    log::info!("Downstream server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind {addr}: {e}");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("Downstream server shutting down.");
        })
        .await
    {
        log::error!("Downstream server error: {e}");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "mode": state.current_mode().await.to_string(),
        "forecast": state.forecast_status().to_string(),
    }))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    log::info!("Client {client_id} connected");

    let mut frame_rx = state.frame_tx.subscribe();

    // Greet with the mode currently in effect
    let greeting = ServerMessage::mode_changed(&state.current_mode().await.to_string());
    if !send_frame(&mut socket, &greeting).await {
        log::info!("Client {client_id} disconnected");
        return;
    }

    loop {
        tokio::select! {
            // Handle incoming messages from the client
            Some(msg) = socket.next() => {
                if let Ok(msg) = msg {
                    match msg {
                        Message::Text(text) => {
                            if !handle_client_text(&mut socket, &state, client_id, text.as_str()).await {
                                break;
                            }
                        }
                        Message::Close(_) => {
                            break;
                        }
                        _ => {}
                    }
                } else {
                    // client disconnected
                    break;
                }
            }
            // Forward broadcast frames from the ticker and forecaster
            Ok(frame) = frame_rx.recv() => {
                if !send_frame(&mut socket, frame.as_ref()).await {
                    break;
                }
            }
        }
    }

    log::info!("Client {client_id} disconnected");
}

/// Handles one text message from a client. Returns false when the socket is
/// no longer usable.
async fn handle_client_text(
    socket: &mut WebSocket,
    state: &AppState,
    client_id: usize,
    text: &str,
) -> bool {
    let Ok(client_msg) = serde_json::from_str::<ClientMessage>(text) else {
        log::warn!("Client {client_id} sent an unreadable message");
        return send_frame(socket, &ServerMessage::error("unreadable message")).await;
    };
    let Some(token) = client_msg.set_mode else {
        return true;
    };

    match token.parse::<AcquisitionMode>() {
        Ok(mode) => match state.request_mode(mode).await {
            Ok(()) => send_frame(socket, &ServerMessage::ack()).await,
            Err(e) => {
                log::error!("Mode change for client {client_id} failed: {e}");
                send_frame(socket, &ServerMessage::error(&e)).await
            }
        },
        Err(e) => send_frame(socket, &ServerMessage::error(&e.to_string())).await,
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerMessage) -> bool {
    match serde_json::to_string(frame) {
        Ok(json_str) => socket.send(Message::Text(json_str.into())).await.is_ok(),
        Err(e) => {
            log::error!("Failed to encode frame: {e}");
            true
        }
    }
}

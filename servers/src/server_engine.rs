use anyhow::Result;
use tokio::signal;

mod engine_logic;
use engine_logic::{config, downstream, forecaster, state, ticker};
use lib_engine::ingestors::live_ws::{live_cell, LiveFeedConfig, LiveWsIngestor};
use lib_engine::loggers::logfile::setup_logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    setup_logging(&config.log_dir(), &config.log_level(), "server_engine")?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = state::AppState::new();

    let (cell_tx, cell_rx) = live_cell();
    let ingestor = LiveWsIngestor::new(
        LiveFeedConfig {
            url: config.feed_url(),
            reconnect_delay: config.feed_reconnect(),
        },
        cell_tx,
    );

    let ingest_handle = tokio::spawn(ingestor.run(shutdown_tx.subscribe()));

    let ticker_handle = tokio::spawn(ticker::run(
        config.clone(),
        app_state.clone(),
        cell_rx,
        shutdown_tx.subscribe(),
    ));

    let forecaster_handle = tokio::spawn(forecaster::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    let downstream_handle = tokio::spawn(downstream::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::try_join!(
        ingest_handle,
        ticker_handle,
        forecaster_handle,
        downstream_handle
    );

    log::info!("Shutdown complete.");
    Ok(())
}

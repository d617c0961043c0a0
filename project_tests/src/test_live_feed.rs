//! # Live Feed Check
//!
//! Connects to a running `server_feed` (or a real sensor bridge) and verifies
//! that every frame normalizes into a well-formed reading, including the
//! legacy-field frames older bridge firmware emits. Requires a live endpoint.

use std::time::{Duration, Instant};

use clap::Parser;
use futures_util::StreamExt;
use lib_engine::readings::normalize_payload;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the feed to check
    #[clap(long, default_value = "ws://127.0.0.1:9101/feed")]
    url: String,

    /// Number of frames to sample before reporting
    #[clap(short, long, default_value_t = 12)]
    frames: usize,

    /// Seconds to wait for any single frame before giving up
    #[clap(long, default_value_t = 30)]
    frame_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    println!("Connecting to {}...", args.url);
    let (ws_stream, _) = match connect_async(args.url.as_str()).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("\n[ERROR] Could not reach the feed (is server_feed running?):");
            eprintln!(">>> {e}");
            std::process::exit(1);
        }
    };
    let (_write, mut read) = ws_stream.split();
    println!("Connected. Sampling {} frames...", args.frames);

    let started = Instant::now();
    let frame_timeout = Duration::from_secs(args.frame_timeout_secs);
    let mut sampled = 0usize;
    let mut legacy = 0usize;
    let mut dropped = 0usize;
    let mut min_aqi = f64::INFINITY;
    let mut max_aqi = f64::NEG_INFINITY;
    let mut last_timestamp = 0i64;

    while sampled < args.frames {
        let msg = match tokio::time::timeout(frame_timeout, read.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                eprintln!("\n[ERROR] Feed transport error: {e}");
                std::process::exit(1);
            }
            Ok(None) => {
                eprintln!("\n[ERROR] Feed closed after {sampled} frames.");
                std::process::exit(1);
            }
            Err(_) => {
                eprintln!(
                    "\n[ERROR] No frame within {}s (after {sampled} frames).",
                    args.frame_timeout_secs
                );
                std::process::exit(1);
            }
        };

        let Message::Text(text) = msg else {
            continue; // pings and the like
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
            dropped += 1;
            continue;
        };
        if value.get("mq135_ppm").is_some() || value.get("aqi").is_some() {
            legacy += 1;
        }
        match normalize_payload(&value) {
            Some(reading) => {
                // The well-formedness contract every consumer relies on.
                assert!(reading.normalized_aqi >= 0.0);
                assert!(reading.sensor_ppm >= 0.0);
                assert!(
                    reading.timestamp >= last_timestamp,
                    "timestamps must not go backwards"
                );
                last_timestamp = reading.timestamp;
                min_aqi = min_aqi.min(reading.normalized_aqi);
                max_aqi = max_aqi.max(reading.normalized_aqi);
                sampled += 1;
                println!(
                    "  frame {:>2}: ts={} aqi={} ppm={:.1}",
                    sampled, reading.timestamp, reading.normalized_aqi, reading.sensor_ppm
                );
            }
            None => dropped += 1,
        }
    }

    println!("\n----- Feed Summary -----");
    println!("Frames sampled : {} in {:?}", sampled, started.elapsed());
    println!("Legacy shape   : {legacy}");
    println!("Dropped        : {dropped}");
    println!("AQI range      : {min_aqi} ..= {max_aqi}");
    println!("------------------------");
    println!("\n--- Feed check passed ---");
}

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "AQI acquisition and forecast gateway", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "AQSTREAM_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "AQSTREAM_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "AQSTREAM_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "AQSTREAM_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "AQSTREAM_DATA_DIR", help = "Directory for the file-backed reading store.")]
    pub data_dir: Option<PathBuf>,

    #[clap(long = "store", env = "AQSTREAM_STORE", help = "Reading store backend: file, redis or none.")]
    pub store_backend: Option<String>,

    #[clap(long, env = "AQSTREAM_REDIS_URL", help = "Redis URL for the redis reading store.")]
    pub redis_url: Option<String>,

    #[clap(long, env = "AQSTREAM_FEED_URL", help = "WebSocket URL of the live sensor feed.")]
    pub feed_url: Option<String>,

    #[clap(long, env = "AQSTREAM_FEED_RECONNECT_MS", help = "Delay in milliseconds between sensor feed reconnect attempts.")]
    pub feed_reconnect_ms: Option<u64>,

    #[clap(long, env = "AQSTREAM_TICK_INTERVAL_MS", help = "Interval in milliseconds between acquired packets.")]
    pub tick_interval_ms: Option<u64>,

    #[clap(long, env = "AQSTREAM_FORECAST_INTERVAL_MS", help = "Interval in milliseconds between forecasts.")]
    pub forecast_interval_ms: Option<u64>,

    #[clap(long, env = "AQSTREAM_PREDICTOR_URL", help = "HTTP endpoint of the external sequence predictor. Heuristic-only when unset.")]
    pub predictor_url: Option<String>,

    #[clap(long, env = "AQSTREAM_PREDICTOR_TIMEOUT_MS", help = "Timeout in milliseconds for external predictor requests.")]
    pub predictor_timeout_ms: Option<u64>,

    #[clap(long, env = "AQSTREAM_RNG_SEED", help = "Seed for synthetic data and forecast jitter; entropy-backed when unset.")]
    pub rng_seed: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            data_dir: other.data_dir.or(self.data_dir),
            store_backend: other.store_backend.or(self.store_backend),
            redis_url: other.redis_url.or(self.redis_url),
            feed_url: other.feed_url.or(self.feed_url),
            feed_reconnect_ms: other.feed_reconnect_ms.or(self.feed_reconnect_ms),
            tick_interval_ms: other.tick_interval_ms.or(self.tick_interval_ms),
            forecast_interval_ms: other.forecast_interval_ms.or(self.forecast_interval_ms),
            predictor_url: other.predictor_url.or(self.predictor_url),
            predictor_timeout_ms: other.predictor_timeout_ms.or(self.predictor_timeout_ms),
            rng_seed: other.rng_seed.or(self.rng_seed),
        }
    }

    // Resolved accessors: every knob has a working default so the rest of
    // the code never handles None.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(9100)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("./data"))
    }

    pub fn store_backend(&self) -> String {
        self.store_backend.clone().unwrap_or_else(|| "file".to_string())
    }

    pub fn redis_url(&self) -> String {
        self.redis_url
            .clone()
            .unwrap_or_else(|| "redis://127.0.0.1:6379/".to_string())
    }

    pub fn feed_url(&self) -> String {
        self.feed_url
            .clone()
            .unwrap_or_else(|| "ws://127.0.0.1:9101/feed".to_string())
    }

    pub fn feed_reconnect(&self) -> Duration {
        Duration::from_millis(self.feed_reconnect_ms.unwrap_or(5_000))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.unwrap_or(1_000))
    }

    pub fn forecast_interval(&self) -> Duration {
        Duration::from_millis(self.forecast_interval_ms.unwrap_or(5_000))
    }

    pub fn predictor_url(&self) -> Option<String> {
        self.predictor_url.clone()
    }

    pub fn predictor_timeout(&self) -> Duration {
        Duration::from_millis(self.predictor_timeout_ms.unwrap_or(10_000))
    }

    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }
}

pub fn load_config() -> Config {
    // 1. Load defaults
    let default_config = Config {
        port: Some(9100),
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        data_dir: Some(PathBuf::from("./data")),
        store_backend: Some("file".to_string()),
        redis_url: Some("redis://127.0.0.1:6379/".to_string()),
        feed_url: Some("ws://127.0.0.1:9101/feed".to_string()),
        feed_reconnect_ms: Some(5_000),
        tick_interval_ms: Some(1_000),
        forecast_interval_ms: Some(5_000),
        predictor_timeout_ms: Some(10_000),
        ..Default::default()
    };

    // 2. Load from config file (server_engine.conf) if present.
    //    Allow overriding default config file path with CLI arg.
    let cli_args_for_path = Config::parse(); // Parse CLI to get potential config_path override early

    let config_file_path = cli_args_for_path
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_engine.conf"));

    let mut current_config = default_config;

    if config_file_path.exists() {
        if let Ok(config_str) = fs::read_to_string(&config_file_path) {
            if let Ok(file_config) = serde_json::from_str::<Config>(&config_str) {
                current_config = current_config.merge(file_config);
            } else {
                log::warn!(
                    "Failed to parse config file: {}. Falling back to other sources.",
                    config_file_path.display()
                );
            }
        } else {
            log::warn!(
                "Failed to read config file: {}. Falling back to other sources.",
                config_file_path.display()
            );
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    // 3. Override with environment variables and CLI arguments.
    //    clap::Parser handles env vars and CLI args in one pass.
    let cli_args_final = Config::parse();
    current_config.merge(cli_args_final)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_override_values() {
        let base = Config {
            port: Some(9100),
            log_level: Some("info".to_string()),
            store_backend: Some("file".to_string()),
            ..Default::default()
        };
        let overlay = Config {
            port: Some(9200),
            store_backend: Some("redis".to_string()),
            ..Default::default()
        };
        let merged = base.merge(overlay);
        assert_eq!(merged.port(), 9200);
        assert_eq!(merged.store_backend(), "redis");
        // untouched fields survive the merge
        assert_eq!(merged.log_level(), "info");
    }

    #[test]
    fn config_file_uses_camel_case_keys() {
        let json = r#"{ "port": 9300, "storeBackend": "none", "tickIntervalMs": 250 }"#;
        let parsed: Config = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.port(), 9300);
        assert_eq!(parsed.store_backend(), "none");
        assert_eq!(parsed.tick_interval(), Duration::from_millis(250));
    }

    #[test]
    fn accessors_fall_back_to_defaults() {
        let empty = Config::default();
        assert_eq!(empty.port(), 9100);
        assert_eq!(empty.store_backend(), "file");
        assert_eq!(empty.tick_interval(), Duration::from_millis(1_000));
        assert!(empty.predictor_url().is_none());
        assert!(empty.rng_seed().is_none());
    }
}

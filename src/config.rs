// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : stockfighter — async Rust client for the Stockfighter trading game
Module  : config.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : REST client for venues/orders/order books, game-master level
          control, and long-lived WebSocket sessions (tickertape and
          executions) with idle watchdog, clean stop, Prometheus metrics
          and optional JSONL quote recording.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.stockfighter.io/ob/api";
pub const DEFAULT_WS_URL: &str = "wss://api.stockfighter.io/ob/api/ws";
pub const DEFAULT_GM_URL: &str = "https://www.stockfighter.io/gm";

#[derive(Clone, Debug)]
pub struct Config {
    // credential (dikirim di setiap request REST & WS)
    pub api_key: String,

    // endpoints
    pub base_url: String,
    pub ws_url: String,
    pub gm_url: String,

    // streaming
    pub idle_timeout: Duration,
    pub watchdog_interval: Duration,

    // REST
    pub http_timeout: Duration,

    // optional sinks
    pub record_file: Option<String>,
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Default endpoints and timings around the given credential.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            gm_url: DEFAULT_GM_URL.to_string(),
            idle_timeout: Duration::from_secs(10),
            watchdog_interval: Duration::from_secs(1),
            http_timeout: Duration::from_secs(10),
            record_file: None,
            metrics_port: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_gm_url(mut self, url: impl Into<String>) -> Self {
        self.gm_url = url.into();
        self
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }

    pub fn with_watchdog_interval(mut self, tick: Duration) -> Self {
        self.watchdog_interval = tick;
        self
    }

    /// Load from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self> {
        // Pastikan .env dibaca (agar STOCKFIGHTER_API_KEY, RECORD_FILE, dll ter-load)
        let _ = dotenv();

        let api_key = env::var("STOCKFIGHTER_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("STOCKFIGHTER_API_KEY is not set".to_string()))?;

        let mut cfg = Config::new(api_key);

        // ===== Endpoints =====
        if let Ok(url) = env::var("STOCKFIGHTER_BASE_URL") {
            cfg.base_url = url;
        }
        if let Ok(url) = env::var("STOCKFIGHTER_WS_URL") {
            cfg.ws_url = url;
        }
        if let Ok(url) = env::var("STOCKFIGHTER_GM_URL") {
            cfg.gm_url = url;
        }

        // ===== Timings =====
        if let Some(secs) = env_parse::<u64>("STOCKFIGHTER_IDLE_TIMEOUT_SECS") {
            cfg.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("STOCKFIGHTER_WATCHDOG_INTERVAL_MS") {
            cfg.watchdog_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = env_parse::<u64>("STOCKFIGHTER_HTTP_TIMEOUT_SECS") {
            cfg.http_timeout = Duration::from_secs(secs);
        }

        // ===== Sinks =====
        cfg.record_file = env::var("RECORD_FILE").ok().filter(|p| !p.is_empty());
        cfg.metrics_port = env_parse("METRICS_PORT");

        Ok(cfg)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

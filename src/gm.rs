// ===============================
// src/gm.rs
// ===============================
//
// Game master: start a level, poll / stop its instance.
// Base URL-nya beda dari order-book API (Config::gm_url).
//
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::Decode;
use crate::error::Result;
use crate::wire::{path, WireClient};

/// Returned when a level starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
    pub account: String,
    pub instance_id: u64,
    #[serde(default)]
    pub instructions: HashMap<String, String>,
    #[serde(rename = "secondsPerTradingDay", default)]
    pub seconds_per_trading_day: u64,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub venues: Vec<String>,
    #[serde(default)]
    pub balances: HashMap<String, i64>,
}

impl Decode for LevelInfo {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDetails {
    #[serde(default)]
    pub end_of_the_world_day: u64,
    #[serde(default)]
    pub trading_day: u64,
}

/// State of a running level instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: u64,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub details: InstanceDetails,
}

impl Decode for Instance {}

/// Game-master client; wraps a [`WireClient`] pointed at the GM base URL.
#[derive(Clone, Debug)]
pub struct GameMaster {
    client: WireClient,
}

impl GameMaster {
    pub fn new(client: WireClient) -> Self {
        Self { client }
    }

    /// `POST /levels/{name}`
    pub async fn start_level(&self, level: &str) -> Result<LevelInfo> {
        let body = self.client.post(&path(&["levels", level]), Vec::new()).await?;
        let info = LevelInfo::decode(&body)?;
        info!(
            level,
            account = %info.account,
            instance = info.instance_id,
            venues = ?info.venues,
            tickers = ?info.tickers,
            "level started"
        );
        Ok(info)
    }

    /// `GET /instances/{id}`
    pub async fn instance(&self, id: u64) -> Result<Instance> {
        let body = self.client.get(&path(&["instances", &id.to_string()])).await?;
        Instance::decode(&body)
    }

    /// `POST /instances/{id}/stop`
    pub async fn stop(&self, id: u64) -> Result<()> {
        let body = self
            .client
            .post(&path(&["instances", &id.to_string(), "stop"]), Vec::new())
            .await?;
        crate::domain::check_ok(&body)
    }
}

// ===============================
// src/domain.rs
// ===============================
//
// Wire model for the Stockfighter REST + WS surface.
//
// Notes:
// - Harga selalu integer sen (u64), qty selalu integer lembar (u64).
//   Ini berlaku di semua tipe (order book juga), tidak ada f64.
// - Semua response punya field `ok`; decode gagal-tutup (fail closed):
//   ok=false / hilang -> Error::RemoteRejected, shape salah -> Error::Decode.
//
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

const NO_MESSAGE: &str = "request rejected without message";

// ---------- success indicator ----------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default, deserialize_with = "ok_flag")]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

// `ok` is a bool on most endpoints but a string on a few legacy ones.
fn ok_flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<bool>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(d)? {
        None => Ok(None),
        Some(Flag::Bool(b)) => Ok(Some(b)),
        Some(Flag::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(D::Error::custom(format!("unrecognised ok flag {other:?}"))),
        },
    }
}

/// Check the success indicator of a raw response body.
pub fn check_ok(payload: &[u8]) -> Result<()> {
    let env: Envelope = serde_json::from_slice(payload)?;
    match env.ok {
        Some(true) => Ok(()),
        _ => Err(Error::RemoteRejected(
            env.error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| NO_MESSAGE.to_string()),
        )),
    }
}

/// Response types decoded from a raw body.
pub trait Decode: DeserializeOwned {
    fn decode(payload: &[u8]) -> Result<Self> {
        check_ok(payload)?;
        Ok(serde_json::from_slice(payload)?)
    }
}

// ---------- identifiers ----------

/// Server-assigned order id, kept as an opaque token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        OrderId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        OrderId(id.to_string())
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(d)? {
            Raw::Num(n) => OrderId(n.to_string()),
            Raw::Text(s) => OrderId(s),
        })
    }
}

// ---------- orders ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    Market,
    Limit,
    FillOrKill,
    ImmediateOrCancel,
}

/// Order as submitted to `POST .../orders`.
///
/// `id` never goes over the wire from our side; it is filled in from the
/// [`ExecutedOrder`] the venue answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(skip)]
    pub id: Option<OrderId>,
    pub account: String,
    pub venue: String,
    #[serde(rename = "stock")]
    pub symbol: String,
    pub price: u64,
    pub qty: u64,
    pub direction: Direction,
    #[serde(rename = "orderType")]
    pub order_type: OrderType,
}

impl Order {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse an order request body (no success indicator on requests).
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub price: u64,
    pub qty: u64,
    pub ts: DateTime<Utc>,
}

/// Server-side view of one order at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedOrder {
    pub symbol: String,
    pub venue: String,
    pub direction: Direction,
    pub original_qty: u64,
    /// Still open on the book.
    pub qty: u64,
    pub price: u64,
    pub order_type: OrderType,
    pub id: OrderId,
    pub account: String,
    pub ts: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fills: Vec<Fill>,
    pub total_filled: u64,
    pub open: bool,
}

impl Decode for ExecutedOrder {}

impl ExecutedOrder {
    pub fn filled_from_fills(&self) -> u64 {
        self.fills.iter().map(|f| f.qty).sum()
    }
}

// ---------- venues & stocks ----------

/// Handle on a venue; carries nothing but the symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Venue {
    #[serde(rename = "venue")]
    pub symbol: String,
}

impl Venue {
    pub fn new(symbol: impl Into<String>) -> Self {
        Venue { symbol: symbol.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub symbol: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StockList {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub symbols: Vec<Stock>,
}

impl Decode for StockList {}

// ---------- order book ----------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: u64,
    pub qty: u64,
    #[serde(rename = "isBuy")]
    pub is_buy: bool,
}

/// Full snapshot; every fetch replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    pub venue: String,
    pub symbol: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bids: Vec<BookLevel>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub asks: Vec<BookLevel>,
    pub ts: DateTime<Utc>,
}

impl Decode for OrderBook {}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    pub fn spread(&self) -> Option<u64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some(a.price.saturating_sub(b.price)),
            _ => None,
        }
    }
}

// ---------- quotes & executions ----------

/// Top of book + last trade. `bid`/`ask`/`last*` are absent while the
/// corresponding side has never traded / is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub venue: String,
    pub bid: Option<u64>,
    pub ask: Option<u64>,
    #[serde(default)]
    pub bid_size: u64,
    #[serde(default)]
    pub ask_size: u64,
    #[serde(default)]
    pub bid_depth: u64,
    #[serde(default)]
    pub ask_depth: u64,
    pub last: Option<u64>,
    pub last_size: Option<u64>,
    pub last_trade: Option<DateTime<Utc>>,
    pub quote_time: DateTime<Utc>,
}

impl Decode for Quote {}

/// Tickertape frame: `{"ok":true,"quote":{...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct TickerMessage {
    pub quote: Quote,
}

impl Decode for TickerMessage {}

/// One fill pairing a standing order with an incoming one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub account: String,
    pub venue: String,
    pub symbol: String,
    /// Post-fill state of the order sides this account holds in the trade.
    /// The feed sends either a single object or an array.
    #[serde(rename = "order", deserialize_with = "one_or_many")]
    pub orders: Vec<ExecutedOrder>,
    pub standing_id: OrderId,
    pub incoming_id: OrderId,
    pub price: u64,
    pub filled: u64,
    pub filled_at: DateTime<Utc>,
    pub standing_complete: bool,
    #[serde(alias = "IncomingComplete")]
    pub incoming_complete: bool,
}

impl Execution {
    /// First order side carried by the fill, usually the account's own.
    pub fn order(&self) -> Option<&ExecutedOrder> {
        self.orders.first()
    }
}

impl Decode for Execution {}

fn one_or_many<'de, D, T>(d: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Raw::deserialize(d)? {
        Raw::Many(v) => v,
        Raw::One(t) => vec![t],
    })
}

fn null_as_empty<'de, D, T>(d: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

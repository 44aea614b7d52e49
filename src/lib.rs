// ===============================
// src/lib.rs
// ===============================
//! Client for the Stockfighter trading-game API.
//!
//! - REST: [`Venue`] / [`Order`] operations over a [`WireClient`].
//! - Streaming: [`StreamSession`] opens one tickertape or executions socket
//!   and pushes [`StreamEvent`]s into an [`EventHandler`] until it ends.
//! - Game master: [`gm::GameMaster`] starts and stops levels.
pub mod api;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod feed;
pub mod gm;
pub mod metrics;
pub mod recorder;
pub mod wire;

pub use api::api_up;
pub use config::Config;
pub use dispatch::{EventHandler, Recording, StreamEvent, TapePrinter};
pub use domain::{
    BookLevel, Decode, Direction, ExecutedOrder, Execution, Fill, Order, OrderBook, OrderId,
    OrderType, Quote, Stock, Venue,
};
pub use error::{Error, Result};
pub use feed::{
    stop_on_ctrl_c, FeedKind, SessionConfig, SessionEnd, SessionHandle, SessionState,
    StreamSession, Subscription, Termination, Transport, WsTransport,
};
pub use recorder::{JsonlRecorder, MemorySink, QuoteSink};
pub use wire::WireClient;

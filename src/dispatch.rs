// ===============================
// src/dispatch.rs
// ===============================
//
// Raw frame -> typed event, and the consumer side of a session.
//
// Delivery is awaited inline by the session's read loop, so a slow
// handler throttles socket reads instead of piling events up in memory.
//
use std::io::Write;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::domain::{Decode, Execution, Quote, TickerMessage};
use crate::error::Error;
use crate::feed::{FeedKind, SessionEnd};
use crate::recorder::QuoteSink;

/// Everything a session hands to its consumer.
#[derive(Debug)]
pub enum StreamEvent {
    Quote(Quote),
    Execution(Execution),
    /// One frame failed to decode (or carried `ok:false`); the session
    /// keeps running.
    Invalid(Error),
    /// Final event of every session, delivered exactly once.
    Closed(SessionEnd),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Closed(_))
    }
}

/// Decode one inbound frame for the given feed.
pub fn decode_frame(kind: FeedKind, payload: &[u8]) -> StreamEvent {
    let decoded = match kind {
        FeedKind::Tickertape => TickerMessage::decode(payload).map(|m| StreamEvent::Quote(m.quote)),
        FeedKind::Executions => Execution::decode(payload).map(StreamEvent::Execution),
    };
    decoded.unwrap_or_else(StreamEvent::Invalid)
}

#[async_trait]
pub trait EventHandler: Send {
    async fn on_event(&mut self, event: StreamEvent);

    /// True once nothing downstream will ever see another event. The
    /// session checks this after each delivery and drains when it flips.
    fn consumer_gone(&self) -> bool {
        false
    }
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Box<H> {
    async fn on_event(&mut self, event: StreamEvent) {
        (**self).on_event(event).await
    }

    fn consumer_gone(&self) -> bool {
        (**self).consumer_gone()
    }
}

/// Forward into a bounded channel; a full channel holds up the read loop.
/// Dropping the receiver stops the session (reported as cancelled).
#[async_trait]
impl EventHandler for mpsc::Sender<StreamEvent> {
    async fn on_event(&mut self, event: StreamEvent) {
        if let Err(e) = self.send(event).await {
            warn!(event = ?e.0, "event receiver dropped, event discarded");
        }
    }

    fn consumer_gone(&self) -> bool {
        self.is_closed()
    }
}

/// Prints one tab-separated line per quote / execution.
pub struct TapePrinter<W> {
    out: W,
}

impl TapePrinter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: std::io::stdout() }
    }
}

impl<W: Write + Send> TapePrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn px(v: Option<u64>) -> String {
    v.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn format_quote(q: &Quote) -> String {
    format!(
        "{}\tBID\t{:>8}\tASK\t{:>8}\tBIDSIZE\t{:>8}\tASKSIZE\t{:>8}\tBIDDEPTH\t{:>8}\tASKDEPTH\t{:>8}\tLAST\t{:>8}\tLASTSIZE\t{:>8}\tTRADE\t{}\tQUOTE\t{}",
        q.symbol,
        px(q.bid),
        px(q.ask),
        q.bid_size,
        q.ask_size,
        q.bid_depth,
        q.ask_depth,
        px(q.last),
        px(q.last_size),
        q.last_trade.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
        q.quote_time.to_rfc3339(),
    )
}

pub fn format_execution(e: &Execution) -> String {
    format!(
        "EXEC\t{}\t{}\t{}\t{}@{}\tSTANDING\t{}{}\tINCOMING\t{}{}\tAT\t{}",
        e.venue,
        e.symbol,
        e.order().map(|o| format!("{:?}", o.direction)).unwrap_or_else(|| "-".to_string()),
        e.filled,
        e.price,
        e.standing_id,
        if e.standing_complete { "*" } else { "" },
        e.incoming_id,
        if e.incoming_complete { "*" } else { "" },
        e.filled_at.to_rfc3339(),
    )
}

#[async_trait]
impl<W: Write + Send> EventHandler for TapePrinter<W> {
    async fn on_event(&mut self, event: StreamEvent) {
        let line = match &event {
            StreamEvent::Quote(q) => format_quote(q),
            StreamEvent::Execution(e) => format_execution(e),
            StreamEvent::Invalid(e) => {
                warn!(?e, "skipping undecodable frame");
                return;
            }
            StreamEvent::Closed(end) => {
                info!(%end, "stream closed");
                if let Err(e) = self.out.flush() {
                    error!(?e, "tape: flush failed");
                }
                return;
            }
        };
        if let Err(e) = writeln!(self.out, "{line}") {
            error!(?e, "tape: write failed");
        }
    }
}

/// Stores every quote in a sink, then hands the event to `inner`.
pub struct Recording<H, S> {
    inner: H,
    sink: S,
}

impl<H: EventHandler, S: QuoteSink> Recording<H, S> {
    pub fn new(inner: H, sink: S) -> Self {
        Self { inner, sink }
    }

    pub fn into_parts(self) -> (H, S) {
        (self.inner, self.sink)
    }
}

#[async_trait]
impl<H: EventHandler, S: QuoteSink> EventHandler for Recording<H, S> {
    async fn on_event(&mut self, event: StreamEvent) {
        match &event {
            StreamEvent::Quote(q) => {
                if let Err(e) = self.sink.store(q).await {
                    error!(?e, symbol = %q.symbol, "quote sink: store failed");
                }
            }
            StreamEvent::Closed(_) => {
                if let Err(e) = self.sink.flush().await {
                    error!(?e, "quote sink: flush failed");
                }
            }
            _ => {}
        }
        self.inner.on_event(event).await;
    }

    fn consumer_gone(&self) -> bool {
        self.inner.consumer_gone()
    }
}

// ===============================
// src/feed.rs
// ===============================
//
// Streaming session (tickertape / executions) over WebSocket.
//
// Lifecycle: Connecting -> Open -> Draining -> Closed. One session = one
// connection; no reconnect, no backoff. Build a new session to reconnect.
//
// While Open:
// - read loop  : recv frame -> decode -> await handler (backpressure),
//                stamps last-activity on every frame (decodable or not)
// - watchdog   : wakes every `watchdog_interval`, stops the session when
//                last-activity is older than `idle_timeout`
// Both only share the `closed` token and the last-activity stamp.
//
// Terminal reasons: read error / remote close (fatal), idle timeout and
// stop() (graceful). Every session delivers exactly one Closed event.
//
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::dispatch::{decode_frame, EventHandler, StreamEvent};
use crate::error::{Error, Result};
use crate::metrics::{
    STREAM_DECODE_ERRORS, STREAM_LAST_EVENT_TS, STREAM_MESSAGES, STREAM_SESSIONS_ACTIVE,
    STREAM_SESSION_ENDS,
};
use crate::wire::{path, AUTH_HEADER};

// ---------- subscription ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Tickertape,
    Executions,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Tickertape => "tickertape",
            FeedKind::Executions => "executions",
        }
    }
}

/// Which stream to open: feed kind, account, venue, optionally one stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub kind: FeedKind,
    pub account: String,
    pub venue: String,
    pub stock: Option<String>,
}

impl Subscription {
    pub fn new(kind: FeedKind, account: impl Into<String>, venue: impl Into<String>) -> Self {
        Self {
            kind,
            account: account.into(),
            venue: venue.into(),
            stock: None,
        }
    }

    pub fn tickertape(account: impl Into<String>, venue: impl Into<String>) -> Self {
        Self::new(FeedKind::Tickertape, account, venue)
    }

    pub fn executions(account: impl Into<String>, venue: impl Into<String>) -> Self {
        Self::new(FeedKind::Executions, account, venue)
    }

    pub fn for_stock(mut self, stock: impl Into<String>) -> Self {
        self.stock = Some(stock.into());
        self
    }

    /// `{ws_base}/{account}/venues/{venue}/{feed}[/stocks/{stock}]`
    pub fn url(&self, ws_base: &str) -> Result<Url> {
        let mut segs = vec![
            self.account.as_str(),
            "venues",
            self.venue.as_str(),
            self.kind.as_str(),
        ];
        if let Some(stock) = &self.stock {
            segs.push("stocks");
            segs.push(stock);
        }
        let raw = format!("{}/{}", ws_base.trim_end_matches('/'), path(&segs));
        Url::parse(&raw).map_err(|e| Error::Config(format!("bad stream url {raw}: {e}")))
    }
}

// ---------- state & termination ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Open = 1,
    Draining = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Draining,
            _ => SessionState::Closed,
        }
    }
}

/// Why a session ended. Carried by the final [`StreamEvent::Closed`].
#[derive(Debug)]
pub enum SessionEnd {
    /// No frame within the idle timeout; value is the observed gap.
    IdleTimeout(Duration),
    /// `stop()` was called.
    Cancelled,
    /// Handshake failure, read failure or remote close.
    Failed(Error),
}

impl SessionEnd {
    pub fn is_graceful(&self) -> bool {
        !matches!(self, SessionEnd::Failed(_))
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            SessionEnd::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn termination(&self) -> Termination {
        match self {
            SessionEnd::IdleTimeout(_) => Termination::IdleTimeout,
            SessionEnd::Cancelled => Termination::Cancelled,
            SessionEnd::Failed(Error::Connect(_) | Error::Config(_)) => Termination::ConnectFailed,
            SessionEnd::Failed(_) => Termination::ReadFailed,
        }
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::IdleTimeout(idle) => write!(f, "idle for {idle:?}"),
            SessionEnd::Cancelled => f.write_str("cancelled"),
            SessionEnd::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Summary of [`SessionEnd`] returned by `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    IdleTimeout,
    Cancelled,
    ConnectFailed,
    ReadFailed,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::IdleTimeout => "idle_timeout",
            Termination::Cancelled => "cancelled",
            Termination::ConnectFailed => "connect_failed",
            Termination::ReadFailed => "read_failed",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StopReason {
    Idle(Duration),
    Cancelled,
}

// State shared by the read loop, the watchdog and any SessionHandle.
#[derive(Debug)]
struct Shared {
    origin: Instant,
    last_activity_ms: AtomicU64,
    closed: CancellationToken,
    stop_reason: OnceLock<StopReason>,
    state: AtomicU8,
}

impl Shared {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            closed: CancellationToken::new(),
            stop_reason: OnceLock::new(),
            state: AtomicU8::new(SessionState::Connecting as u8),
        }
    }

    fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }

    // first reason wins
    fn request_stop(&self, reason: StopReason) {
        let _ = self.stop_reason.set(reason);
        self.closed.cancel();
    }

    fn set_state(&self, s: SessionState) {
        self.state.store(s as u8, Ordering::SeqCst);
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// Cloneable control handle for a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Ask the session to stop. Graceful: ends with [`SessionEnd::Cancelled`]
    /// unless another reason got there first. Safe to call repeatedly.
    pub fn stop(&self) {
        self.shared.request_stop(StopReason::Cancelled);
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// True once the session has started draining (or is closed).
    pub fn is_stopping(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Time since the last received frame.
    pub fn idle_for(&self) -> Duration {
        self.shared.idle_for()
    }

    /// Resolves when the session starts draining.
    pub async fn stopping(&self) {
        self.shared.closed.cancelled().await
    }
}

/// Stop the session on Ctrl-C. The listener exits on its own once the
/// session is stopping for any other reason.
pub fn stop_on_ctrl_c(handle: SessionHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            r = tokio::signal::ctrl_c() => match r {
                Ok(()) => {
                    info!("interrupt");
                    handle.stop();
                }
                Err(e) => error!(?e, "ctrl_c listener failed"),
            },
            _ = handle.stopping() => {}
        }
    })
}

// ---------- transport ----------

/// The socket underneath a session.
#[async_trait]
pub trait Transport: Send {
    /// Next data frame. Errors on socket failure and on remote close.
    async fn recv(&mut self) -> Result<Vec<u8>>;

    /// Close the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}

pub struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl WsTransport {
    /// Handshake with the credential header attached.
    pub async fn connect(url: &Url, api_key: &str) -> Result<Self> {
        let mut req = url.as_str().into_client_request().map_err(Error::Connect)?;
        let mut auth = HeaderValue::from_str(api_key)
            .map_err(|_| Error::Config("api key is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        req.headers_mut().insert(HeaderName::from_static(AUTH_HEADER), auth);

        let (ws, rsp) = connect_async(req).await.map_err(Error::Connect)?;
        debug!(status = %rsp.status(), "ws handshake done");
        Ok(Self { ws, closed: false })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(t))) => return Ok(t.into_bytes()),
                Some(Ok(Message::Binary(b))) => return Ok(b),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "server sent close frame");
                    return Err(Error::StreamClosed);
                }
                // ping / pong / raw frame
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::StreamRead(e)),
                None => return Err(Error::StreamClosed),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(Error::StreamRead(e)),
        }
    }
}

// ---------- session ----------

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
    pub watchdog_interval: Duration,
}

impl SessionConfig {
    pub fn new(idle_timeout: Duration, watchdog_interval: Duration) -> Self {
        Self {
            idle_timeout,
            watchdog_interval: watchdog_interval.max(Duration::from_millis(1)),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        SessionConfig::new(cfg.idle_timeout, cfg.watchdog_interval)
    }
}

/// One streaming connection. Consumed by `run`; not reusable.
pub struct StreamSession {
    subscription: Subscription,
    ws_base: String,
    api_key: String,
    settings: SessionConfig,
    shared: Arc<Shared>,
}

impl StreamSession {
    pub fn new(cfg: &Config, subscription: Subscription) -> Self {
        Self {
            subscription,
            ws_base: cfg.ws_url.clone(),
            api_key: cfg.api_key.clone(),
            settings: SessionConfig::from(cfg),
            shared: Arc::new(Shared::new()),
        }
    }

    pub fn with_settings(mut self, settings: SessionConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: self.shared.clone(),
        }
    }

    /// Run on a background task.
    pub fn spawn<H>(self, handler: H) -> (SessionHandle, JoinHandle<Termination>)
    where
        H: EventHandler + 'static,
    {
        let handle = self.handle();
        (handle, tokio::spawn(self.run(handler)))
    }

    /// Run on a background task, delivering into a bounded channel.
    pub fn spawn_channel(
        self,
        capacity: usize,
    ) -> (SessionHandle, mpsc::Receiver<StreamEvent>, JoinHandle<Termination>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (handle, task) = self.spawn(tx);
        (handle, rx, task)
    }

    /// Connect, then stream into `handler` until the session ends.
    pub async fn run<H: EventHandler>(self, mut handler: H) -> Termination {
        self.shared.set_state(SessionState::Connecting);
        info!(
            feed = self.subscription.kind.as_str(),
            account = %self.subscription.account,
            venue = %self.subscription.venue,
            stock = ?self.subscription.stock,
            "stream: connecting"
        );

        let connected = tokio::select! {
            biased;
            _ = self.shared.closed.cancelled() => None,
            r = self.connect() => Some(r),
        };

        match connected {
            Some(Ok(transport)) => self.run_on(transport, handler).await,
            Some(Err(e)) => {
                error!(?e, venue = %self.subscription.venue, "stream: connect failed");
                self.finish(&mut handler, SessionEnd::Failed(e)).await
            }
            None => {
                let end = self.stopped_end();
                self.finish(&mut handler, end).await
            }
        }
    }

    async fn connect(&self) -> Result<WsTransport> {
        let url = self.subscription.url(&self.ws_base)?;
        WsTransport::connect(&url, &self.api_key).await
    }

    /// Stream over an already-open transport.
    pub async fn run_on<T, H>(self, mut transport: T, mut handler: H) -> Termination
    where
        T: Transport,
        H: EventHandler,
    {
        let kind = self.subscription.kind;
        let feed = kind.as_str();
        let venue = self.subscription.venue.as_str();

        self.shared.touch();
        self.shared.set_state(SessionState::Open);
        STREAM_SESSIONS_ACTIVE.inc();
        info!(feed, venue, idle_timeout = ?self.settings.idle_timeout, "stream: open");

        let watchdog = tokio::spawn(watchdog(self.shared.clone(), self.settings));

        let failure = loop {
            let frame = tokio::select! {
                biased;
                _ = self.shared.closed.cancelled() => break None,
                f = transport.recv() => f,
            };
            match frame {
                Ok(payload) => {
                    self.shared.touch();
                    STREAM_MESSAGES.with_label_values(&[feed, venue]).inc();
                    STREAM_LAST_EVENT_TS
                        .with_label_values(&[feed, venue])
                        .set(Utc::now().timestamp());

                    let event = decode_frame(kind, &payload);
                    if let StreamEvent::Invalid(e) = &event {
                        STREAM_DECODE_ERRORS.with_label_values(&[feed, venue]).inc();
                        warn!(?e, feed, venue, "stream: undecodable frame, continuing");
                    }
                    handler.on_event(event).await;
                    if handler.consumer_gone() {
                        info!(feed, venue, "stream: consumer gone, stopping");
                        self.shared.request_stop(StopReason::Cancelled);
                    }
                }
                Err(e) => {
                    error!(?e, feed, venue, "stream: read failed");
                    break Some(e);
                }
            }
        };

        // ---- Draining ----
        self.shared.set_state(SessionState::Draining);
        self.shared.closed.cancel();
        if let Err(e) = transport.close().await {
            debug!(?e, feed, venue, "stream: close reported error");
        }
        if let Err(e) = watchdog.await {
            error!(?e, "stream: watchdog task failed");
        }
        STREAM_SESSIONS_ACTIVE.dec();

        let end = match failure {
            Some(e) => SessionEnd::Failed(e),
            None => self.stopped_end(),
        };
        self.finish(&mut handler, end).await
    }

    fn stopped_end(&self) -> SessionEnd {
        match self.shared.stop_reason.get() {
            Some(StopReason::Idle(idle)) => SessionEnd::IdleTimeout(*idle),
            Some(StopReason::Cancelled) | None => SessionEnd::Cancelled,
        }
    }

    async fn finish<H: EventHandler>(&self, handler: &mut H, end: SessionEnd) -> Termination {
        let termination = end.termination();
        self.shared.closed.cancel();
        self.shared.set_state(SessionState::Closed);
        STREAM_SESSION_ENDS
            .with_label_values(&[self.subscription.kind.as_str(), termination.as_str()])
            .inc();
        info!(
            feed = self.subscription.kind.as_str(),
            venue = %self.subscription.venue,
            reason = %end,
            "stream: closed"
        );
        handler.on_event(StreamEvent::Closed(end)).await;
        termination
    }
}

async fn watchdog(shared: Arc<Shared>, settings: SessionConfig) {
    let mut tick = tokio::time::interval(settings.watchdog_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // first tick fires immediately
    tick.tick().await;

    loop {
        tokio::select! {
            _ = shared.closed.cancelled() => break,
            _ = tick.tick() => {
                let idle = shared.idle_for();
                if idle > settings.idle_timeout {
                    warn!(?idle, limit = ?settings.idle_timeout, "stream: no messages, giving up");
                    shared.request_stop(StopReason::Idle(idle));
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const QUOTE: &str = r#"{"ok": true, "quote": {"symbol": "FOOBAR", "venue": "TESTEX",
        "bid": 5100, "ask": 5125, "quoteTime": "2015-07-13T05:38:17.33640392Z"}}"#;

    struct Scripted {
        rx: mpsc::UnboundedReceiver<Result<Vec<u8>>>,
        reads: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn recv(&mut self) -> Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.rx.recv().await {
                Some(r) => r,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        tx: mpsc::UnboundedSender<Result<Vec<u8>>>,
        reads: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    fn scripted() -> (Scripted, Fixture) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reads = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        (
            Scripted { rx, reads: reads.clone(), closes: closes.clone() },
            Fixture { tx, reads, closes },
        )
    }

    fn session(idle_ms: u64, tick_ms: u64) -> StreamSession {
        let cfg = Config::new("test-key")
            .with_idle_timeout(Duration::from_millis(idle_ms))
            .with_watchdog_interval(Duration::from_millis(tick_ms));
        StreamSession::new(&cfg, Subscription::tickertape("EXB123456", "TESTEX"))
    }

    fn drain(rx: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn subscription_urls() {
        let base = "wss://api.stockfighter.io/ob/api/ws/";
        let venue = Subscription::tickertape("EXB123456", "TESTEX").url(base).unwrap();
        assert_eq!(
            venue.as_str(),
            "wss://api.stockfighter.io/ob/api/ws/EXB123456/venues/TESTEX/tickertape"
        );
        let stock = Subscription::executions("EXB123456", "TESTEX")
            .for_stock("FOOBAR")
            .url(base)
            .unwrap();
        assert_eq!(
            stock.as_str(),
            "wss://api.stockfighter.io/ob/api/ws/EXB123456/venues/TESTEX/executions/stocks/FOOBAR"
        );
    }

    #[tokio::test]
    async fn frames_then_read_error() {
        let (transport, fx) = scripted();
        for _ in 0..3 {
            fx.tx.send(Ok(QUOTE.as_bytes().to_vec())).unwrap();
        }
        fx.tx.send(Err(Error::StreamClosed)).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let s = session(5_000, 10);
        let handle = s.handle();
        let term = s.run_on(transport, tx).await;

        assert_eq!(term, Termination::ReadFailed);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert!(events[..3].iter().all(|e| matches!(e, StreamEvent::Quote(_))));
        assert!(matches!(&events[3], StreamEvent::Closed(SessionEnd::Failed(Error::StreamClosed))));
        assert_eq!(fx.closes.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn malformed_frame_does_not_end_session() {
        let (transport, fx) = scripted();
        fx.tx.send(Ok(QUOTE.as_bytes().to_vec())).unwrap();
        fx.tx.send(Ok(b"{not json".to_vec())).unwrap();
        fx.tx.send(Ok(QUOTE.as_bytes().to_vec())).unwrap();
        fx.tx.send(Err(Error::StreamClosed)).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        session(5_000, 10).run_on(transport, tx).await;

        let events = drain(&mut rx);
        assert!(matches!(events[0], StreamEvent::Quote(_)));
        assert!(matches!(events[1], StreamEvent::Invalid(Error::Decode(_))));
        assert!(matches!(events[2], StreamEvent::Quote(_)));
        assert!(events[3].is_terminal());
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn idle_timeout_closes_once() {
        let (transport, fx) = scripted();
        let (tx, mut rx) = mpsc::channel(4);

        let term = tokio::time::timeout(
            Duration::from_secs(2),
            session(100, 10).run_on(transport, tx),
        )
        .await
        .expect("watchdog should stop the session");

        assert_eq!(term, Termination::IdleTimeout);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Closed(end) => {
                assert!(end.is_graceful());
                assert!(end.error().is_none());
                assert!(matches!(end, SessionEnd::IdleTimeout(d) if *d > Duration::from_millis(100)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fx.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn traffic_keeps_session_alive_until_stop() {
        let (transport, fx) = scripted();
        let (tx, mut rx) = mpsc::channel(64);
        let s = session(100, 10);
        let handle = s.handle();
        let run = tokio::spawn(s.run_on(transport, tx));
        for _ in 0..8 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            fx.tx.send(Ok(QUOTE.as_bytes().to_vec())).unwrap();
        }
        assert_eq!(handle.state(), SessionState::Open);
        handle.stop();
        handle.stop();

        assert_eq!(run.await.unwrap(), Termination::Cancelled);
        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(StreamEvent::Closed(SessionEnd::Cancelled))));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(fx.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_before_run_ends_cancelled() {
        let (transport, fx) = scripted();
        let (tx, mut rx) = mpsc::channel(4);
        let s = session(5_000, 10);
        s.handle().stop();

        assert_eq!(s.run_on(transport, tx).await, Termination::Cancelled);
        assert_eq!(fx.reads.load(Ordering::SeqCst), 0);
        assert!(matches!(drain(&mut rx).as_slice(), [StreamEvent::Closed(SessionEnd::Cancelled)]));
    }

    #[tokio::test]
    async fn dropped_receiver_stops_session() {
        let (transport, fx) = scripted();
        fx.tx.send(Ok(QUOTE.as_bytes().to_vec())).unwrap();

        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let term = tokio::time::timeout(Duration::from_secs(2), session(60_000, 10).run_on(transport, tx))
            .await
            .expect("session should not wait for the idle timeout");

        assert_eq!(term, Termination::Cancelled);
        assert_eq!(fx.reads.load(Ordering::SeqCst), 1);
        assert_eq!(fx.closes.load(Ordering::SeqCst), 1);
    }

    struct SlowProbe {
        reads: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl EventHandler for SlowProbe {
        async fn on_event(&mut self, event: StreamEvent) {
            if let StreamEvent::Quote(_) = event {
                self.seen.lock().unwrap().push(self.reads.load(Ordering::SeqCst));
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }

    #[tokio::test]
    async fn slow_handler_throttles_reads() {
        let (transport, fx) = scripted();
        for _ in 0..3 {
            fx.tx.send(Ok(QUOTE.as_bytes().to_vec())).unwrap();
        }
        fx.tx.send(Err(Error::StreamClosed)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let probe = SlowProbe { reads: fx.reads.clone(), seen: seen.clone() };
        session(5_000, 10).run_on(transport, probe).await;

        // the n-th quote is delivered before the (n+1)-th read starts
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}

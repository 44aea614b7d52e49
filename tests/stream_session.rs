// ===============================
// tests/stream_session.rs
// ===============================
//
// Streaming sessions against a local tokio-tungstenite server.
//
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use stockfighter::{
    Config, Error, SessionEnd, StreamEvent, StreamSession, Subscription, Termination, Venue,
};

const KEY: &str = "test-api-key";

const QUOTE: &str = r#"{"ok": true, "quote": {"symbol": "FOOBAR", "venue": "TESTEX",
    "bid": 5100, "ask": 5125, "bidSize": 392, "askSize": 711, "bidDepth": 2748,
    "askDepth": 2237, "last": 5125, "lastSize": 52,
    "lastTrade": "2015-07-13T05:38:17.33640392Z", "quoteTime": "2015-07-13T05:38:17.33640392Z"}}"#;

const EXECUTION: &str = r#"{"ok": true, "account": "EXB123456", "venue": "TESTEX", "symbol": "FOOBAR",
    "order": {"ok": true, "symbol": "FOOBAR", "venue": "TESTEX", "direction": "buy",
        "originalQty": 10, "qty": 8, "price": 5200, "orderType": "limit", "id": 1337,
        "account": "EXB123456", "ts": "2015-12-04T09:02:16.680986205Z",
        "fills": [{"price": 5200, "qty": 2, "ts": "2015-12-04T09:02:16.680986205Z"}],
        "totalFilled": 2, "open": true},
    "standingId": 1337, "incomingId": 1338, "price": 5200, "filled": 2,
    "filledAt": "2015-12-04T09:02:16.680986205Z",
    "standingComplete": false, "incomingComplete": true}"#;

#[derive(Debug, Clone)]
enum Step {
    Send(&'static str),
    /// Send a close frame and stop.
    Close,
    /// Drop the TCP stream without a close handshake.
    Drop,
    /// Read until the client goes away.
    AwaitClient,
}

#[derive(Debug, Default)]
struct ServerLog {
    auth: Option<String>,
    path: String,
    client_close_frames: usize,
}

async fn ws_server(script: Vec<Step>) -> (Config, JoinHandle<ServerLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut log = ServerLog::default();

        let mut auth = None;
        let mut path = String::new();
        let callback = |req: &Request, rsp: Response| -> Result<Response, ErrorResponse> {
            auth = req
                .headers()
                .get("x-starfighter-authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            path = req.uri().path().to_string();
            Ok(rsp)
        };
        let mut ws = accept_hdr_async(stream, callback).await.unwrap();
        log.auth = auth;
        log.path = path;

        for step in script {
            match step {
                Step::Send(text) => ws.send(Message::Text(text.to_string())).await.unwrap(),
                Step::Close => {
                    let _ = ws.close(None).await;
                    return log;
                }
                Step::Drop => return log,
                Step::AwaitClient => {
                    while let Some(Ok(msg)) = ws.next().await {
                        if msg.is_close() {
                            log.client_close_frames += 1;
                        }
                    }
                    return log;
                }
            }
        }
        log
    });

    let cfg = Config::new(KEY)
        .with_ws_url(format!("ws://{addr}/ob/api/ws"))
        .with_idle_timeout(Duration::from_millis(300))
        .with_watchdog_interval(Duration::from_millis(20));
    (cfg, task)
}

async fn collect(session: StreamSession) -> (Termination, Vec<StreamEvent>) {
    let (tx, mut rx) = mpsc::channel(64);
    let term = tokio::time::timeout(Duration::from_secs(5), session.run(tx))
        .await
        .expect("session should terminate");
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    (term, events)
}

#[tokio::test]
async fn quotes_then_remote_close() {
    let (cfg, server) = ws_server(vec![Step::Send(QUOTE), Step::Send(QUOTE), Step::Close]).await;

    let session = Venue::new("TESTEX").tickertape(&cfg, "EXB123456", None);
    let (term, events) = collect(session).await;

    assert_eq!(term, Termination::ReadFailed);
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], StreamEvent::Quote(q) if q.bid == Some(5100)));
    assert!(matches!(&events[1], StreamEvent::Quote(_)));
    match &events[2] {
        StreamEvent::Closed(end) => {
            assert!(!end.is_graceful());
            assert!(matches!(end.error(), Some(Error::StreamClosed | Error::StreamRead(_))));
        }
        other => panic!("unexpected {other:?}"),
    }

    let log = server.await.unwrap();
    assert_eq!(log.auth.as_deref(), Some(KEY));
    assert_eq!(log.path, "/ob/api/ws/EXB123456/venues/TESTEX/tickertape");
}

#[tokio::test]
async fn abrupt_disconnect_is_fatal() {
    let (cfg, server) = ws_server(vec![Step::Send(QUOTE), Step::Drop]).await;

    let (term, events) = collect(StreamSession::new(&cfg, Subscription::tickertape("EXB123456", "TESTEX"))).await;
    server.await.unwrap();

    assert_eq!(term, Termination::ReadFailed);
    assert!(matches!(events[0], StreamEvent::Quote(_)));
    assert!(matches!(events.last(), Some(StreamEvent::Closed(SessionEnd::Failed(_)))));
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn malformed_execution_frame_is_skipped() {
    let (cfg, server) = ws_server(vec![
        Step::Send(EXECUTION),
        Step::Send(r#"{"ok": true, "account": 12}"#),
        Step::Send(EXECUTION),
        Step::Close,
    ])
    .await;

    let session = Venue::new("TESTEX").executions(&cfg, "EXB123456", Some("FOOBAR"));
    let (term, events) = collect(session).await;

    assert_eq!(term, Termination::ReadFailed);
    assert_eq!(events.len(), 4);
    assert!(matches!(&events[0], StreamEvent::Execution(e) if e.incoming_complete && e.filled == 2));
    assert!(matches!(events[1], StreamEvent::Invalid(Error::Decode(_))));
    assert!(matches!(events[2], StreamEvent::Execution(_)));
    assert!(events[3].is_terminal());

    let log = server.await.unwrap();
    assert_eq!(log.path, "/ob/api/ws/EXB123456/venues/TESTEX/executions/stocks/FOOBAR");
}

#[tokio::test]
async fn idle_stream_times_out_and_closes_once() {
    let (cfg, server) = ws_server(vec![Step::Send(QUOTE), Step::AwaitClient]).await;

    let session = StreamSession::new(&cfg, Subscription::tickertape("EXB123456", "TESTEX"));
    let handle = session.handle();
    let (term, events) = collect(session).await;

    assert_eq!(term, Termination::IdleTimeout);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], StreamEvent::Closed(SessionEnd::IdleTimeout(_))));
    assert_eq!(handle.state(), stockfighter::SessionState::Closed);

    let log = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should see the client go away")
        .unwrap();
    assert_eq!(log.client_close_frames, 1);
}

#[tokio::test]
async fn stop_ends_session_gracefully() {
    let (cfg, server) = ws_server(vec![Step::Send(QUOTE), Step::AwaitClient]).await;
    let cfg = cfg.with_idle_timeout(Duration::from_secs(30));

    let session = StreamSession::new(&cfg, Subscription::tickertape("EXB123456", "TESTEX"));
    let (handle, mut rx, task) = session.spawn_channel(8);

    assert!(matches!(rx.recv().await, Some(StreamEvent::Quote(_))));
    handle.stop();

    assert_eq!(task.await.unwrap(), Termination::Cancelled);
    let mut rest = Vec::new();
    while let Some(ev) = rx.recv().await {
        rest.push(ev);
    }
    assert!(matches!(rest.last(), Some(StreamEvent::Closed(SessionEnd::Cancelled))));
    assert_eq!(rest.iter().filter(|e| e.is_terminal()).count(), 1);

    let log = server.await.unwrap();
    assert_eq!(log.client_close_frames, 1);
}

#[tokio::test]
async fn connect_failure_is_terminal_event() {
    let cfg = Config::new(KEY).with_ws_url("ws://127.0.0.1:1/ob/api/ws");
    let (term, events) = collect(StreamSession::new(&cfg, Subscription::tickertape("EXB123456", "TESTEX"))).await;

    assert_eq!(term, Termination::ConnectFailed);
    assert!(matches!(events.as_slice(), [StreamEvent::Closed(SessionEnd::Failed(Error::Connect(_)))]));
}

// ===============================
// src/metrics.rs
// ===============================
use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Streaming --------
pub static STREAM_MESSAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stream_messages_total", "frames received on streaming sessions"),
        &["feed", "venue"],
    )
    .unwrap()
});

pub static STREAM_DECODE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stream_decode_errors_total",
            "frames that failed to decode (session kept running)",
        ),
        &["feed", "venue"],
    )
    .unwrap()
});

pub static STREAM_SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("stream_sessions_active", "streaming sessions currently open").unwrap()
});

pub static STREAM_SESSION_ENDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stream_session_ends_total", "streaming session terminations"),
        &["feed", "reason"],
    )
    .unwrap()
});

pub static STREAM_LAST_EVENT_TS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "stream_last_event_ts",
            "Unix seconds of the last received stream frame",
        ),
        &["feed", "venue"],
    )
    .unwrap()
});

// -------- REST --------
pub static REST_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rest_requests_total", "REST requests by method and status class"),
        &["method", "status"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(STREAM_MESSAGES.clone())),
        REGISTRY.register(Box::new(STREAM_DECODE_ERRORS.clone())),
        REGISTRY.register(Box::new(STREAM_SESSIONS_ACTIVE.clone())),
        REGISTRY.register(Box::new(STREAM_SESSION_ENDS.clone())),
        REGISTRY.register(Box::new(STREAM_LAST_EVENT_TS.clone())),
        REGISTRY.register(Box::new(REST_REQUESTS.clone())),
    ] {
        // already registered on a second init() is fine
        let _ = m;
    }
}

/// "2xx", "4xx", ... or "transport" when no response came back.
pub fn status_class(status: Option<u16>) -> &'static str {
    match status {
        Some(200..=299) => "2xx",
        Some(300..=399) => "3xx",
        Some(400..=499) => "4xx",
        Some(500..=599) => "5xx",
        Some(_) => "other",
        None => "transport",
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

async fn handle(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let body = encode_metrics();
    let rsp = Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::from("# no metrics\n")));
    Ok(rsp)
}

/// Serve every path with the text exposition until the server errors.
pub async fn serve_metrics(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(handle)) });

    let server = match Server::try_bind(&addr) {
        Ok(b) => b.serve(make_svc),
        Err(e) => {
            error!(?e, %addr, "metrics: bind failed");
            return;
        }
    };
    info!(%addr, "metrics: serving");
    if let Err(e) = server.await {
        error!(?e, "metrics: server stopped");
    }
}

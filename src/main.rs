// ===============================
// src/main.rs
// ===============================
/*
 # stream semua quote TESTEX sampai idle 10 detik / Ctrl-C
 STOCKFIGHTER_API_KEY=... cargo run -- --venue TESTEX --account EXB123456

 # executions untuk satu stock, rekam quote ke file, metrics di :9898
 RECORD_FILE=data/quotes.jsonl METRICS_PORT=9898 \
   cargo run -- --venue TESTEX --account EXB123456 --stock FOOBAR --executions
*/
/*
=============================================================================
Project : stockfighter — async Rust client for the Stockfighter trading game
Module  : main.rs
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
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stockfighter::{
    metrics, stop_on_ctrl_c, Config, EventHandler, FeedKind, JsonlRecorder, Recording, TapePrinter,
    Termination, Venue, WireClient,
};

#[derive(Debug, Parser)]
#[command(about = "Stream a Stockfighter tickertape or execution feed")]
struct Args {
    /// Venue symbol, e.g. TESTEX
    #[arg(long)]
    venue: String,

    /// Trading account, e.g. EXB123456
    #[arg(long)]
    account: String,

    /// Limit the feed to one stock
    #[arg(long)]
    stock: Option<String>,

    /// Stream executions instead of quotes
    #[arg(long)]
    executions: bool,

    /// Override STOCKFIGHTER_IDLE_TIMEOUT_SECS
    #[arg(long)]
    idle_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // ---- Config ----
    let mut cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "config");
            return ExitCode::FAILURE;
        }
    };
    if let Some(secs) = args.idle_secs {
        cfg.idle_timeout = Duration::from_secs(secs);
    }

    // ---- Metrics ----
    metrics::init();
    if let Some(port) = cfg.metrics_port {
        tokio::spawn(metrics::serve_metrics(port));
    }

    let kind = if args.executions { FeedKind::Executions } else { FeedKind::Tickertape };
    info!(
        venue = %args.venue,
        account = %args.account,
        stock = ?args.stock,
        feed = kind.as_str(),
        rest = %cfg.base_url,
        ws = %cfg.ws_url,
        idle_timeout = ?cfg.idle_timeout,
        record_file = ?cfg.record_file,
        "startup config"
    );

    // ---- Heartbeat ----
    let client = match WireClient::from_config(&cfg) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "rest client");
            return ExitCode::FAILURE;
        }
    };
    let venue = Venue::new(args.venue.clone());
    match venue.up(&client).await {
        Ok(true) => info!(venue = %venue.symbol, "venue is up"),
        Ok(false) => {
            error!(venue = %venue.symbol, "venue is down");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!(%e, venue = %venue.symbol, "heartbeat failed");
            return ExitCode::FAILURE;
        }
    }

    // ---- Consumer (tape + optional recorder) ----
    let handler: Box<dyn EventHandler> = match cfg.record_file.clone() {
        Some(path) => match JsonlRecorder::open(path).await {
            Ok(rec) => Box::new(Recording::new(TapePrinter::stdout(), rec)),
            Err(e) => {
                error!(%e, "recorder");
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(TapePrinter::stdout()),
    };

    // ---- Stream ----
    let stock = args.stock.as_deref();
    let session = match kind {
        FeedKind::Tickertape => venue.tickertape(&cfg, &args.account, stock),
        FeedKind::Executions => venue.executions(&cfg, &args.account, stock),
    };
    let (handle, task) = session.spawn(handler);
    let _interrupt = stop_on_ctrl_c(handle);

    match task.await {
        Ok(t) => {
            info!(termination = t.as_str(), "done");
            match t {
                Termination::IdleTimeout | Termination::Cancelled => ExitCode::SUCCESS,
                Termination::ConnectFailed | Termination::ReadFailed => ExitCode::FAILURE,
            }
        }
        Err(e) => {
            error!(?e, "session task failed");
            ExitCode::FAILURE
        }
    }
}

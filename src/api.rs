// ===============================
// src/api.rs
// ===============================
//
// REST operations. Venue dan Order tidak menyimpan state koneksi; semua
// operasi adalah fungsi dari symbol + WireClient (base URL + credential).
//
use reqwest::StatusCode;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{check_ok, Decode, ExecutedOrder, Order, OrderBook, OrderId, Quote, Stock, StockList, Venue};
use crate::error::{Error, Result};
use crate::feed::{FeedKind, StreamSession, Subscription};
use crate::wire::{path, WireClient};

/// API-wide liveness (`GET /heartbeat`).
pub async fn api_up(client: &WireClient) -> Result<bool> {
    let (status, body) = client.get_with_status("heartbeat").await?;
    Ok(up_from(status, &body, "api"))
}

// Anything short of a 2xx with `ok:true` counts as down: rejected JSON,
// error status, or a proxy page that isn't JSON at all.
fn up_from(status: StatusCode, body: &[u8], what: &str) -> bool {
    match check_ok(body) {
        Ok(()) if status.is_success() => true,
        Ok(()) => {
            warn!(%what, %status, "heartbeat ok but status is not success");
            false
        }
        Err(Error::RemoteRejected(msg)) => {
            warn!(%what, %status, %msg, "heartbeat says down");
            false
        }
        Err(e) => {
            warn!(%what, %status, ?e, "heartbeat body unreadable, treating as down");
            false
        }
    }
}

impl Venue {
    /// `GET /venues/{venue}/heartbeat`. A down or unknown venue (including
    /// an error page in front of it) is `Ok(false)`; transport failures are errors.
    pub async fn up(&self, client: &WireClient) -> Result<bool> {
        let (status, body) = client
            .get_with_status(&path(&["venues", &self.symbol, "heartbeat"]))
            .await?;
        Ok(up_from(status, &body, &self.symbol))
    }

    pub async fn stocks(&self, client: &WireClient) -> Result<Vec<Stock>> {
        let body = client.get(&path(&["venues", &self.symbol, "stocks"])).await?;
        Ok(StockList::decode(&body)?.symbols)
    }

    pub async fn order_book(&self, client: &WireClient, stock: &str) -> Result<OrderBook> {
        let body = client
            .get(&path(&["venues", &self.symbol, "stocks", stock]))
            .await?;
        OrderBook::decode(&body)
    }

    pub async fn quote(&self, client: &WireClient, stock: &str) -> Result<Quote> {
        let body = client
            .get(&path(&["venues", &self.symbol, "stocks", stock, "quote"]))
            .await?;
        Quote::decode(&body)
    }

    pub async fn order_status(&self, client: &WireClient, stock: &str, id: &OrderId) -> Result<ExecutedOrder> {
        let body = client
            .get(&path(&["venues", &self.symbol, "stocks", stock, "orders", id.as_str()]))
            .await?;
        ExecutedOrder::decode(&body)
    }

    /// `DELETE /venues/{venue}/stocks/{stock}/orders/{id}`.
    pub async fn cancel(&self, client: &WireClient, stock: &str, id: &OrderId) -> Result<bool> {
        client
            .delete(&path(&["venues", &self.symbol, "stocks", stock, "orders", id.as_str()]))
            .await
    }

    /// Quote feed for the whole venue, or one stock when `stock` is set.
    pub fn tickertape(&self, cfg: &Config, account: &str, stock: Option<&str>) -> StreamSession {
        self.session(cfg, account, stock, FeedKind::Tickertape)
    }

    /// Fill feed for the account on this venue, or one stock when `stock` is set.
    pub fn executions(&self, cfg: &Config, account: &str, stock: Option<&str>) -> StreamSession {
        self.session(cfg, account, stock, FeedKind::Executions)
    }

    fn session(&self, cfg: &Config, account: &str, stock: Option<&str>, kind: FeedKind) -> StreamSession {
        let mut sub = Subscription::new(kind, account, &self.symbol);
        if let Some(s) = stock {
            sub = sub.for_stock(s);
        }
        StreamSession::new(cfg, sub)
    }
}

impl Order {
    /// Submit to `POST /venues/{venue}/stocks/{stock}/orders`.
    ///
    /// On acceptance the server id is written back into `self.id`.
    pub async fn execute(&mut self, client: &WireClient) -> Result<ExecutedOrder> {
        let body = client
            .post(
                &path(&["venues", &self.venue, "stocks", &self.symbol, "orders"]),
                self.encode()?,
            )
            .await?;
        let executed = ExecutedOrder::decode(&body)?;
        info!(
            id = %executed.id,
            venue = %executed.venue,
            symbol = %executed.symbol,
            filled = executed.total_filled,
            open = executed.open,
            "order accepted"
        );
        self.id = Some(executed.id.clone());
        Ok(executed)
    }

    /// Cancel a previously executed order. An order never accepted has no
    /// id and cannot be cancelled.
    pub async fn cancel(&self, client: &WireClient) -> Result<bool> {
        let id = self
            .id
            .as_ref()
            .ok_or(Error::NotAccepted)?;
        Venue::new(self.venue.clone()).cancel(client, &self.symbol, id).await
    }
}

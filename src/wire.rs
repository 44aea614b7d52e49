// ===============================
// src/wire.rs
// ===============================
//
// Thin authenticated HTTP client for the REST surface.
// - Setiap request membawa header X-Starfighter-Authorization.
// - POST membawa Content-Type: application/json.
// - Body dikembalikan apa adanya; interpretasi `ok` ada di domain::Decode.
//
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, StatusCode};
use tracing::debug;

use crate::config::Config;
use crate::domain::check_ok;
use crate::error::{Error, Result};
use crate::metrics::{status_class, REST_REQUESTS};

pub const AUTH_HEADER: &str = "x-starfighter-authorization";

#[derive(Clone, Debug)]
pub struct WireClient {
    http: reqwest::Client,
    base: String,
}

impl WireClient {
    pub fn new(base_url: impl Into<String>, api_key: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(AUTH_HEADER), auth_value(api_key)?);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client for the order-book API (`base_url`).
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(cfg.base_url.clone(), &cfg.api_key, cfg.http_timeout)
    }

    /// Client for the game-master API (`gm_url`).
    pub fn gm_from_config(cfg: &Config) -> Result<Self> {
        Self::new(cfg.gm_url.clone(), &cfg.api_key, cfg.http_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let (_, body) = self.get_with_status(path).await?;
        Ok(body)
    }

    /// Like [`get`](Self::get) but keeps the HTTP status for callers that
    /// judge the response by it (heartbeats).
    pub async fn get_with_status(&self, path: &str) -> Result<(StatusCode, Vec<u8>)> {
        self.send(Method::GET, self.http.get(self.url(path))).await
    }

    pub async fn post(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let req = self
            .http
            .post(self.url(path))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let (_, body) = self.send(Method::POST, req).await?;
        Ok(body)
    }

    /// `true` when the venue accepted the delete. A JSON body with a false
    /// success indicator is surfaced as `RemoteRejected`.
    pub async fn delete(&self, path: &str) -> Result<bool> {
        let (status, body) = self.send(Method::DELETE, self.http.delete(self.url(path))).await?;
        if !body.iter().all(u8::is_ascii_whitespace) {
            match check_ok(&body) {
                Err(Error::RemoteRejected(msg)) => return Err(Error::RemoteRejected(msg)),
                // non-JSON body: status code is all we have
                Err(_) | Ok(()) => {}
            }
        }
        Ok(status.is_success())
    }

    async fn send(&self, method: Method, req: RequestBuilder) -> Result<(StatusCode, Vec<u8>)> {
        let rsp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                REST_REQUESTS
                    .with_label_values(&[method.as_str(), status_class(None)])
                    .inc();
                return Err(e.into());
            }
        };
        let status = rsp.status();
        REST_REQUESTS
            .with_label_values(&[method.as_str(), status_class(Some(status.as_u16()))])
            .inc();
        debug!(%method, url = %rsp.url(), %status, "rest call");

        let body = rsp.bytes().await?;
        Ok((status, body.to_vec()))
    }
}

pub(crate) fn auth_value(api_key: &str) -> Result<HeaderValue> {
    let mut v = HeaderValue::from_str(api_key)
        .map_err(|_| Error::Config("api key is not a valid header value".to_string()))?;
    v.set_sensitive(true);
    Ok(v)
}

/// Join path segments, percent-encoding each one.
pub fn path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

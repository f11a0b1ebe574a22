//! Blocking HTTP client for the analytics backend.
//!
//! The backend exposes `GET /data`, `POST /set_price`, `POST /set_auto`, and a
//! `GET /video_feed` MJPEG stream. Every request is a single exchange without
//! retries; the poll timer is the only retry mechanism.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Serialize;
use tracing::debug;

use crate::{
    error::PollError,
    types::{BackendSnapshot, PriceUpdate, ZoneReset},
};

/// Default backend location when nothing is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything able to produce a telemetry snapshot. The poller only depends on
/// this so it can be driven by a fake source in tests.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch_snapshot(&self) -> Result<BackendSnapshot, PollError>;
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    base_url: String,
    http: Client,
}

impl BackendClient {
    /// Build a client for `base_url`. A trailing slash is stripped so paths can
    /// be appended verbatim.
    pub fn new(base_url: &str) -> Result<Self, PollError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| PollError::Client(err.to_string()))?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Location of the live annotated camera stream.
    pub fn video_feed_url(&self) -> String {
        format!("{}/video_feed", self.base_url)
    }

    /// `GET /data`, decoded and validated.
    pub fn fetch_snapshot(&self) -> Result<BackendSnapshot, PollError> {
        let url = format!("{}/data", self.base_url);
        let response = self.http.get(&url).send()?;
        let response = ensure_success(response, "/data")?;
        let body = response.bytes()?;
        parse_snapshot(&body)
    }

    /// `POST /set_price`: pin a zone to an operator-chosen price.
    pub fn set_manual_price(&self, zone_name: &str, price: f64) -> Result<(), PollError> {
        self.post(
            "/set_price",
            &PriceUpdate {
                zone_name,
                price,
            },
        )
    }

    /// `POST /set_auto`: hand a zone back to automatic pricing.
    pub fn set_auto_price(&self, zone_name: &str) -> Result<(), PollError> {
        self.post("/set_auto", &ZoneReset { zone_name })
    }

    fn post<T: Serialize>(&self, endpoint: &'static str, body: &T) -> Result<(), PollError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.http.post(&url).json(body).send()?;
        ensure_success(response, endpoint)?;
        debug!("{endpoint} accepted");
        Ok(())
    }
}

impl SnapshotSource for BackendClient {
    fn fetch_snapshot(&self) -> Result<BackendSnapshot, PollError> {
        BackendClient::fetch_snapshot(self)
    }
}

/// Decode a `/data` body into a snapshot, rejecting payloads that parse but do
/// not satisfy the snapshot invariants.
pub fn parse_snapshot(body: &[u8]) -> Result<BackendSnapshot, PollError> {
    let snapshot: BackendSnapshot =
        serde_json::from_slice(body).map_err(|err| PollError::Malformed(err.to_string()))?;
    snapshot.validate().map_err(PollError::Malformed)?;
    Ok(snapshot)
}

fn ensure_success(response: Response, endpoint: &'static str) -> Result<Response, PollError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(PollError::Http {
            endpoint,
            status: status.as_u16(),
        })
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let base = if trimmed.is_empty() {
        DEFAULT_BACKEND_URL
    } else {
        trimmed
    };
    base.trim_end_matches('/').to_string()
}

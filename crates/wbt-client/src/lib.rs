//! wbt-client
//!
//! HTTP fetch client for the warehouse box-tariff endpoint.
//!
//! This crate owns the transport concerns only: bounded-timeout GET,
//! retry with exponential backoff, bearer auth, and the JSON decode.
//! Shape validation lives in wbt-schema; callers that want the fused
//! fetch-and-validate path use the [`TariffSource`] trait.

pub mod retry;

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde_json::Value;
use wbt_schema::{validate, TariffSnapshot};

pub use retry::RetryPolicy;

/// Default timeout for generic API calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Tighter bound for the tariff call specifically: it is on the hot
/// scheduled path and must fail fast enough to leave the cycle usable.
pub const TARIFF_TIMEOUT: Duration = Duration::from_secs(8);

const TARIFF_PATH: &str = "/api/v1/tariffs/box";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failures the fetch client may return.
#[derive(Debug)]
pub enum FetchError {
    /// The attempt exceeded its time bound. Carries the bound that was
    /// in force, so logs show "timed out after 8s" rather than a bare
    /// transport string.
    Timeout { elapsed: Duration },
    /// Network / DNS / connection failure.
    Transport(String),
    /// The server answered with a non-2xx status. Not retried; carries
    /// the status and body for diagnostics.
    Status { status: u16, body: String },
    /// The response body was not valid JSON.
    Decode(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Timeout { elapsed } => {
                write!(f, "fetch timeout after {}ms", elapsed.as_millis())
            }
            FetchError::Transport(msg) => write!(f, "transport error: {msg}"),
            FetchError::Status { status, body } => {
                write!(f, "http status error {status}: {body}")
            }
            FetchError::Decode(msg) => write!(f, "response decode error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Timeout and transport failures are worth another attempt; a
    /// response that actually arrived is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout { .. } | FetchError::Transport(_))
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the tariff API.
///
/// The base URL is overridable so tests can point it at a local mock
/// server. The token is optional; when present it is attached as a
/// bearer `Authorization` header unless the caller already set one.
#[derive(Debug, Clone)]
pub struct TariffApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    tariff_timeout: Duration,
    retry: RetryPolicy,
}

impl TariffApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
            timeout: DEFAULT_TIMEOUT,
            tariff_timeout: TARIFF_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, timeout: Duration, tariff_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.tariff_timeout = tariff_timeout;
        self
    }

    pub fn tariff_url(&self, date: NaiveDate) -> String {
        format!(
            "{}{}?date={}",
            self.base_url.trim_end_matches('/'),
            TARIFF_PATH,
            date.format("%Y-%m-%d")
        )
    }

    /// Issue a retried, bounded-timeout GET and decode the body as JSON.
    ///
    /// The retry loop covers the request send (connect, TLS, headers):
    /// timeouts and transport failures are retried per the policy, while
    /// a response that arrived with a bad status is surfaced as-is.
    /// Caller-supplied headers are merged in untouched; the bearer token
    /// is added only when no `Authorization` header is present.
    pub async fn fetch_json(
        &self,
        url: &str,
        timeout: Duration,
        extra_headers: Option<HeaderMap>,
    ) -> Result<Value, FetchError> {
        let mut headers = extra_headers.unwrap_or_default();
        if let Some(token) = &self.token {
            if !headers.contains_key(AUTHORIZATION) {
                let value = format!("Bearer {token}")
                    .parse()
                    .map_err(|e| FetchError::Transport(format!("invalid auth header: {e}")))?;
                headers.insert(AUTHORIZATION, value);
            }
        }

        let response = retry::retry_with_backoff(&self.retry, || async {
            self.http
                .get(url)
                .headers(headers.clone())
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| classify_reqwest_error(e, timeout))
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(e, timeout))?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Fetch the raw tariff payload for `date` (8s bound).
    pub async fn fetch_tariffs_raw(&self, date: NaiveDate) -> Result<Value, FetchError> {
        let url = self.tariff_url(date);
        self.fetch_json(&url, self.tariff_timeout, None).await
    }
}

fn classify_reqwest_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { elapsed: timeout }
    } else {
        FetchError::Transport(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// TariffSource seam
// ---------------------------------------------------------------------------

/// Upstream tariff source contract consumed by the run coordinator.
///
/// Object-safe and `Send + Sync` so the coordinator can hold an
/// `Arc<dyn TariffSource>` across scheduler callbacks; tests substitute
/// an in-process mock.
#[async_trait::async_trait]
pub trait TariffSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Fetch and validate one snapshot for `date`.
    async fn fetch(&self, date: NaiveDate) -> Result<TariffSnapshot>;
}

#[async_trait::async_trait]
impl TariffSource for TariffApiClient {
    fn source_name(&self) -> &'static str {
        "wb-tariffs-api"
    }

    async fn fetch(&self, date: NaiveDate) -> Result<TariffSnapshot> {
        let url = self.tariff_url(date);
        let raw = self.fetch_json(&url, self.tariff_timeout, None).await?;
        let snapshot = validate(&raw, Some(&url))?;
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests (mock server, no real network)
// ---------------------------------------------------------------------------

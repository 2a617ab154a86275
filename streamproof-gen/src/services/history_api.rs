//! Upstream streaming-history API client
//!
//! Raw single-attempt requests with failure classification; the retry
//! policy lives in the collector, which wraps every call in one shared
//! retrying primitive. The client enforces bearer auth, a per-request
//! timeout, and a client-side minimum interval between requests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const USER_AGENT: &str = "streamproof/0.1.0";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const RATE_LIMIT_MS: u64 = 250; // minimum interval between upstream requests

/// Upstream fetch errors, classified for the retry policy.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Credential rejected (401). Never retried.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Token lacks the required scope (403). Never retried.
    #[error("access denied: {0}")]
    Permission(String),

    /// Upstream asked us to back off (429).
    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },

    /// Upstream failure, including unexpected statuses.
    #[error("upstream error {status}: {message}")]
    Server { status: u16, message: String },

    /// Transport-level failure (DNS, TLS, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not match the expected page shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Terminal conditions abort the run immediately; everything else goes
    /// through the bounded retry loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchError::Auth(_) | FetchError::Permission(_))
    }
}

/// Upstream account profile. Only the id (immediately hashed) and two
/// non-identifying attributes are consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub country: Option<String>,
    pub product: Option<String>,
}

/// One page of recently-played history, newest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub items: Vec<PlayedItem>,
}

/// A single play entry. Fields are optional so one malformed item can be
/// skipped without failing the whole page.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayedItem {
    pub track: Option<TrackRef>,
    pub played_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackRef {
    pub id: Option<String>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
}

/// Snapshot of top-ranked tracks over a named window.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopTracksPage {
    #[serde(default)]
    pub items: Vec<TrackRef>,
}

/// Historical windows offered by the top-items endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopWindow {
    Short,
    Medium,
    Long,
}

impl TopWindow {
    pub const ALL: [TopWindow; 3] = [TopWindow::Short, TopWindow::Medium, TopWindow::Long];

    pub fn as_query(&self) -> &'static str {
        match self {
            TopWindow::Short => "short_term",
            TopWindow::Medium => "medium_term",
            TopWindow::Long => "long_term",
        }
    }
}

/// Single-attempt upstream operations. The collector owns retries, budget
/// checks, and pagination; implementations only classify failures.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    async fn profile(&self) -> Result<UserProfile, FetchError>;

    /// Plays strictly before `before_ms` (exclusive), newest first.
    async fn recently_played(
        &self,
        limit: u32,
        before_ms: Option<i64>,
    ) -> Result<HistoryPage, FetchError>;

    async fn top_tracks(&self, window: TopWindow, limit: u32) -> Result<TopTracksPage, FetchError>;
}

/// Minimum-interval limiter so bursts of page requests stay inside the
/// upstream's goodwill even before it answers 429.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Production client over the streaming provider's REST API.
pub struct StreamingClient {
    http_client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl StreamingClient {
    pub fn new(token: &str, base_url: String) -> Result<Self, FetchError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| FetchError::Auth("token is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            rate_limiter: RateLimiter::new(RATE_LIMIT_MS),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, FetchError> {
        self.rate_limiter.wait().await;

        tracing::debug!(url = %url, "querying upstream history API");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 401 {
            return Err(FetchError::Auth("bearer token rejected".to_string()));
        }

        if status.as_u16() == 403 {
            return Err(FetchError::Permission(
                "token lacks required scope".to_string(),
            ));
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FetchError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl HistoryApi for StreamingClient {
    async fn profile(&self) -> Result<UserProfile, FetchError> {
        self.get_json(format!("{}/me", self.base_url)).await
    }

    async fn recently_played(
        &self,
        limit: u32,
        before_ms: Option<i64>,
    ) -> Result<HistoryPage, FetchError> {
        let mut url = format!(
            "{}/me/player/recently-played?limit={}",
            self.base_url, limit
        );
        if let Some(before) = before_ms {
            url.push_str(&format!("&before={before}"));
        }
        self.get_json(url).await
    }

    async fn top_tracks(&self, window: TopWindow, limit: u32) -> Result<TopTracksPage, FetchError> {
        self.get_json(format!(
            "{}/me/top/tracks?time_range={}&limit={}",
            self.base_url,
            window.as_query(),
            limit
        ))
        .await
    }
}

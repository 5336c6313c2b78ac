//! Rate-limited REST client with upstream error classification.

use std::fmt;
use std::time::Duration;

use feeds_core::{FeedError, RateLimiter, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::PolygonConfig;

const PROVIDER: &str = "polygon";

/// Longest body excerpt carried in an error message.
const MAX_MESSAGE_LEN: usize = 200;

/// REST client for the Polygon API.
///
/// Every request passes through the client's [`RateLimiter`] and carries the
/// API key as the `apiKey` query parameter.
pub struct RestClient {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl RestClient {
    /// Create a client from configuration.
    pub fn new(api_key: impl Into<String>, config: &PolygonConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| FeedError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, api_key, config))
    }

    /// Create a client with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, api_key: impl Into<String>, config: &PolygonConfig) -> Self {
        Self {
            client,
            base_url: config.rest_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            limiter: RateLimiter::new(config.min_request_interval()),
        }
    }

    /// Rate limiter shared by every request of this client.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Build the request URL for `endpoint` with `params` and the API key.
    fn url(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{endpoint}", self.base_url))
            .map_err(|e| FeedError::InvalidParameter(format!("invalid endpoint {endpoint}: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .append_pair("apiKey", &self.api_key);
        Ok(url)
    }

    /// Issue a GET request and return the parsed JSON body.
    pub async fn request(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self.url(endpoint, params)?;

        let permit = self.limiter.acquire().await;
        debug!(provider = PROVIDER, endpoint, "REST request");
        permit.dispatched();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let text = response
            .text()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        let body = serde_json::from_str::<Value>(&text).ok();

        if let Some(err) = classify(status, retry_after, body.as_ref(), &text) {
            warn!(
                provider = PROVIDER,
                endpoint,
                status = status.as_u16(),
                error = %err,
                "REST request failed"
            );
            return Err(err);
        }

        body.ok_or_else(|| {
            FeedError::validation(format!(
                "{endpoint}: response is not JSON: {}",
                excerpt(&text)
            ))
        })
    }
}

/// Map a response onto an error, or `None` when it carries usable data.
pub(crate) fn classify(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: Option<&Value>,
    raw: &str,
) -> Option<FeedError> {
    let message = body
        .and_then(upstream_message)
        .unwrap_or_else(|| excerpt(raw));
    let body_status = body
        .and_then(|b| b.get("status"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let auth = || FeedError::Auth {
        provider: PROVIDER.to_string(),
        message: message.clone(),
    };
    let throttled = || FeedError::RateLimited {
        provider: PROVIDER.to_string(),
        retry_after,
    };

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Some(auth());
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(throttled());
    }

    let body_error = body_status.eq_ignore_ascii_case("ERROR")
        || body_status.eq_ignore_ascii_case("NOT_AUTHORIZED")
        || body.is_some_and(|b| b.get("error").is_some_and(|e| !e.is_null()));

    if !status.is_success() || body_error {
        let lower = message.to_ascii_lowercase();
        if body_status.eq_ignore_ascii_case("NOT_AUTHORIZED")
            || lower.contains("api key")
            || lower.contains("apikey")
        {
            return Some(auth());
        }
        if lower.contains("exceeded") {
            return Some(throttled());
        }
        return Some(FeedError::Http {
            status: status.as_u16(),
            message,
        });
    }

    None
}

fn upstream_message(body: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

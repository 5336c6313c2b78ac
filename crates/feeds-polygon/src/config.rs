//! Provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default REST base URL.
pub const DEFAULT_REST_BASE_URL: &str = "https://api.polygon.io";

/// Default stocks WebSocket URL.
pub const DEFAULT_WS_URL: &str = "wss://socket.polygon.io/stocks";

/// A streaming channel; each maps to a subscription prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Trades (`T.`).
    Trade,
    /// Quotes (`Q.`).
    Quote,
    /// Per-second aggregates (`A.`).
    Aggregate,
}

impl Channel {
    /// Every channel, in subscription order.
    pub const ALL: [Self; 3] = [Self::Trade, Self::Quote, Self::Aggregate];

    /// Subscription prefix for this channel.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Trade => "T",
            Self::Quote => "Q",
            Self::Aggregate => "A",
        }
    }
}

/// Reconnection backoff policy.
///
/// The n-th consecutive reconnect waits `base_delay * 2^n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Configuration for [`PolygonProvider`](crate::PolygonProvider).
///
/// Every field has a default, so partial documents deserialize:
///
/// ```rust
/// use feeds_polygon::PolygonConfig;
///
/// let config: PolygonConfig = serde_json::from_str(r#"{"max_reconnect_attempts": 3}"#).unwrap();
/// assert_eq!(config.max_reconnect_attempts, 3);
/// assert_eq!(config.min_request_interval_ms, 1000);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolygonConfig {
    /// REST base URL, without a trailing slash.
    pub rest_base_url: String,
    /// WebSocket URL.
    pub ws_url: String,
    /// Minimum gap between REST requests.
    pub min_request_interval_ms: u64,
    /// Base reconnect delay.
    pub reconnect_base_delay_ms: u64,
    /// Consecutive reconnect failures tolerated before giving up.
    pub max_reconnect_attempts: u32,
    /// Channels requested for each subscribed symbol.
    pub channels: Vec<Channel>,
    /// REST request timeout.
    pub request_timeout_secs: u64,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        Self {
            rest_base_url: DEFAULT_REST_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            min_request_interval_ms: 1000,
            reconnect_base_delay_ms: 1000,
            max_reconnect_attempts: 5,
            channels: Channel::ALL.to_vec(),
            request_timeout_secs: 30,
        }
    }
}

impl PolygonConfig {
    /// Minimum gap between REST requests.
    #[must_use]
    pub const fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// REST request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff policy for the stream.
    #[must_use]
    pub const fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: self.reconnect_base_delay_ms,
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

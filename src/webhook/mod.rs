//! Webhook registrations.
//!
//! A registration lives for `duration` from the moment it is stored, or
//! until the absolute `until` instant when one is given. Both are bounded
//! by `webhook.max_ttl`; `until` may overshoot `now + max_ttl` by at most
//! `webhook.jitter`.
//!
//! Registrations are held in memory only, keyed by delivery URL, so
//! re-registering a URL replaces the previous entry.

pub mod v2;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::WebhookConfig;
use crate::error::GatewayError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("invalid registration body: {0}")]
    Decode(String),
    #[error("config.url is required")]
    MissingUrl,
    #[error("config.url {0:?} is not a valid http(s) URL")]
    InvalidUrl(String),
    #[error("events must list at least one event regex")]
    MissingEvents,
    #[error("either duration or until is required")]
    MissingExpiry,
    #[error("duration must be between 0 and {0}")]
    InvalidDuration(String),
    #[error("until must not be later than {0}")]
    InvalidUntil(String),
}

impl From<WebhookError> for GatewayError {
    fn from(err: WebhookError) -> Self {
        GatewayError::bad_request(err)
    }
}

/// Registration lifetime as sent on the wire.
///
/// Accepts integer seconds or a duration string (`"5m"`, `"300s"`, `"-1s"`)
/// and is written back as a string. Negative values are representable so
/// they can be reported as invalid instead of failing to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WebhookDuration(TimeDelta);

impl Default for WebhookDuration {
    fn default() -> Self {
        Self(TimeDelta::zero())
    }
}

impl WebhookDuration {
    pub fn from_std(d: Duration) -> Self {
        Self(TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX))
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn as_delta(self) -> TimeDelta {
        self.0
    }
}

impl fmt::Display for WebhookDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < TimeDelta::zero() { "-" } else { "" };
        let magnitude = self.0.abs().to_std().unwrap_or_default();
        write!(f, "{sign}{}", humantime::format_duration(magnitude))
    }
}

impl Serialize for WebhookDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WebhookDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Seconds(i64),
            Text(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Seconds(secs) => TimeDelta::try_seconds(secs)
                .map(Self)
                .ok_or_else(|| de::Error::custom(format!("duration {secs}s out of range"))),
            Wire::Text(text) => parse_signed(&text).map(Self).map_err(de::Error::custom),
        }
    }
}

fn parse_signed(text: &str) -> Result<TimeDelta, String> {
    let text = text.trim();
    let (negative, magnitude) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if magnitude == "0" {
        return Ok(TimeDelta::zero());
    }
    let parsed = humantime::parse_duration(magnitude)
        .map_err(|e| format!("invalid duration {text:?}: {e}"))?;
    let delta = TimeDelta::from_std(parsed).map_err(|_| format!("duration {text:?} out of range"))?;
    Ok(if negative { -delta } else { delta })
}

/// `until` on the wire: RFC 3339. The zero time (`0001-01-01T00:00:00Z`)
/// and `null` both mean "not set".
mod until_format {
    use super::{DateTime, Datelike, Deserialize, Deserializer, Serializer, Utc};

    pub fn serialize<S: Serializer>(until: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match until {
            Some(t) => serializer.collect_str(&t.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let until = Option::<DateTime<Utc>>::deserialize(deserializer)?;
        Ok(until.filter(|t| t.year() > 1))
    }
}

/// Where and how events are delivered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Matcher {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_id: Vec<String>,
}

/// A webhook registration request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registered_from_address: String,
    #[serde(default)]
    pub config: DeliveryConfig,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub matcher: Matcher,
    #[serde(default)]
    pub duration: WebhookDuration,
    #[serde(default, with = "until_format", skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

impl Registration {
    pub fn from_json(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|e| WebhookError::Decode(e.to_string()))
    }
}

/// Duration must sit within `[0, max_ttl]`.
pub fn check_duration(duration: WebhookDuration, config: &WebhookConfig) -> Result<(), WebhookError> {
    let max = WebhookDuration::from_std(config.max_ttl);
    if duration < WebhookDuration::default() || duration > max {
        return Err(WebhookError::InvalidDuration(max.to_string()));
    }
    Ok(())
}

/// `until`, when set, must not pass `now + max_ttl + jitter`.
pub fn check_until(
    until: Option<DateTime<Utc>>,
    config: &WebhookConfig,
    now: DateTime<Utc>,
) -> Result<(), WebhookError> {
    let Some(until) = until else {
        return Ok(());
    };
    let limit = now
        + WebhookDuration::from_std(config.max_ttl).as_delta()
        + WebhookDuration::from_std(config.jitter).as_delta();
    if until > limit {
        return Err(WebhookError::InvalidUntil(limit.to_rfc3339()));
    }
    Ok(())
}

/// Strict validation applied to every stored registration.
pub fn validate(registration: &Registration, config: &WebhookConfig, now: DateTime<Utc>) -> Result<(), WebhookError> {
    let url = registration.config.url.trim();
    if url.is_empty() {
        return Err(WebhookError::MissingUrl);
    }
    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return Err(WebhookError::InvalidUrl(url.to_string())),
    }
    if registration.events.iter().all(|e| e.trim().is_empty()) {
        return Err(WebhookError::MissingEvents);
    }
    if registration.duration.is_zero() && registration.until.is_none() {
        return Err(WebhookError::MissingExpiry);
    }
    check_duration(registration.duration, config)?;
    check_until(registration.until, config, now)
}

struct Stored {
    registration: Registration,
    expires_at: DateTime<Utc>,
}

/// In-memory registration store.
#[derive(Default)]
pub struct WebhookRegistry {
    hooks: RwLock<HashMap<String, Stored>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `registration`, replacing any entry for the same URL. Returns
    /// when it expires.
    pub async fn register(&self, registration: Registration, now: DateTime<Utc>) -> DateTime<Utc> {
        let expires_at = registration
            .until
            .unwrap_or_else(|| now + registration.duration.as_delta());
        let url = registration.config.url.trim().to_string();

        let mut hooks = self.hooks.write().await;
        hooks.retain(|_, stored| stored.expires_at > now);
        info!(url = %url, events = ?registration.events, %expires_at, "Webhook registered");
        hooks.insert(
            url,
            Stored {
                registration,
                expires_at,
            },
        );
        expires_at
    }

    /// Registrations still live at `now`, with secrets withheld.
    pub async fn list(&self, now: DateTime<Utc>) -> Vec<Registration> {
        let hooks = self.hooks.read().await;
        let mut live: Vec<Registration> = hooks
            .values()
            .filter(|stored| stored.expires_at > now)
            .map(|stored| {
                let mut registration = stored.registration.clone();
                registration.config.secret.clear();
                registration
            })
            .collect();
        live.sort_by(|a, b| a.config.url.cmp(&b.config.url));
        live
    }
}

//! A single provider endpoint and its rotation state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capability::CapabilityClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointStatus {
    Active,
    RateLimited,
    Error,
    Offline,
}

/// An endpoint is usable once its error count stays below this
/// threshold; at or above it, the endpoint waits for its recovery timer.
pub const ERROR_THRESHOLD: u32 = 5;

/// Default per-endpoint request window, fixed at one minute unless a
/// provider-supplied reset instant overrides it.
pub const DEFAULT_MAX_REQUESTS_PER_WINDOW: u32 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub name: String,
    pub class: CapabilityClass,
    pub base_url: String,
    /// Credential is kept out of Debug/Display-friendly serialization
    /// paths by callers; stored here because the registry owns endpoint
    /// identity end to end.
    pub credential: String,
    pub status: EndpointStatus,
    pub error_count: u32,
    pub last_used: Option<DateTime<Utc>>,
    pub rate_limit_reset: Option<DateTime<Utc>>,
    pub requests_made_this_window: u32,
    pub max_requests_per_window: u32,
}

impl ProviderEndpoint {
    pub fn new(name: impl Into<String>, class: CapabilityClass, base_url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class,
            base_url: base_url.into(),
            credential: credential.into(),
            status: EndpointStatus::Active,
            error_count: 0,
            last_used: None,
            rate_limit_reset: None,
            requests_made_this_window: 0,
            max_requests_per_window: DEFAULT_MAX_REQUESTS_PER_WINDOW,
        }
    }

    /// Whether this endpoint can currently be selected, clearing expired
    /// rate limits in the process. An endpoint in `Error` status remains
    /// selectable below the error threshold (it was just rotated away
    /// from, not disabled) but never at or above it — recovery from
    /// there is the exclusive job of the recovery timer.
    pub fn is_available(&mut self, now: DateTime<Utc>) -> bool {
        match self.status {
            EndpointStatus::Offline => false,
            EndpointStatus::Error => self.error_count < ERROR_THRESHOLD,
            EndpointStatus::RateLimited => {
                if let Some(reset_at) = self.rate_limit_reset {
                    if now >= reset_at {
                        self.status = EndpointStatus::Active;
                        self.rate_limit_reset = None;
                        self.requests_made_this_window = 0;
                        return true;
                    }
                }
                false
            }
            EndpointStatus::Active => true,
        }
    }

    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.last_used = Some(now);
        self.requests_made_this_window += 1;
    }

    pub fn mark_error(&mut self) {
        self.error_count += 1;
        self.status = EndpointStatus::Error;
    }

    pub fn mark_rate_limited(&mut self, reset_at: DateTime<Utc>) {
        self.status = EndpointStatus::RateLimited;
        self.rate_limit_reset = Some(reset_at);
    }

    /// Recovery timer expiry: endpoint returns to `Active` with a
    /// zeroed error count.
    pub fn recover(&mut self) {
        self.status = EndpointStatus::Active;
        self.error_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn endpoint() -> ProviderEndpoint {
        ProviderEndpoint::new("exa_1", CapabilityClass::Exa, "https://api.exa.ai", "key")
    }

    #[test]
    fn fresh_endpoint_is_available() {
        let mut e = endpoint();
        assert!(e.is_available(Utc::now()));
    }

    #[test]
    fn rate_limited_endpoint_recovers_after_reset_and_zeroes_window() {
        let mut e = endpoint();
        e.requests_made_this_window = 42;
        let now = Utc::now();
        e.mark_rate_limited(now - ChronoDuration::seconds(1));
        assert!(e.is_available(now));
        assert_eq!(e.status, EndpointStatus::Active);
        assert_eq!(e.requests_made_this_window, 0);
    }

    #[test]
    fn rate_limited_endpoint_unavailable_before_reset() {
        let mut e = endpoint();
        let now = Utc::now();
        e.mark_rate_limited(now + ChronoDuration::seconds(30));
        assert!(!e.is_available(now));
    }

    #[test]
    fn error_endpoint_below_threshold_stays_available() {
        let mut e = endpoint();
        e.mark_error();
        assert!(e.is_available(Utc::now()));
    }

    #[test]
    fn error_endpoint_at_threshold_unavailable_until_recovered() {
        let mut e = endpoint();
        for _ in 0..ERROR_THRESHOLD {
            e.mark_error();
        }
        assert!(!e.is_available(Utc::now()));
        e.recover();
        assert!(e.is_available(Utc::now()));
        assert_eq!(e.error_count, 0);
    }
}

//! Provider Registry & Rotation Manager.
//!
//! Fronts a heterogeneous set of third-party endpoints behind a uniform
//! "give me a healthy provider of class X" interface, encoding the
//! rate-limit and error-recovery policy described in the design. All
//! mutation happens under a single per-registry lock
//! (`tokio::sync::Mutex`); recovery timers run as detached background
//! tasks that re-acquire the lock on expiry rather than blocking a
//! caller on the wait.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::capability::{fallback_chain, CapabilityClass, ServiceType};
use super::endpoint::{EndpointStatus, ProviderEndpoint};
use crate::errors::ProviderError;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ClassCounts {
    pub active: usize,
    pub rate_limited: usize,
    pub error: usize,
    pub offline: usize,
}

struct ClassState {
    endpoints: Vec<ProviderEndpoint>,
    current_index: usize,
}

impl ClassState {
    fn new(endpoints: Vec<ProviderEndpoint>) -> Self {
        Self {
            endpoints,
            current_index: 0,
        }
    }
}

struct RegistryState {
    classes: HashMap<CapabilityClass, ClassState>,
}

/// Process-global provider registry. Cheap to clone (wraps an `Arc`);
/// clones share the same underlying state and lock.
#[derive(Clone)]
pub struct ProviderRegistry {
    state: Arc<Mutex<RegistryState>>,
    recovery_delay: Duration,
}

impl ProviderRegistry {
    pub fn new(recovery_delay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                classes: HashMap::new(),
            })),
            recovery_delay,
        }
    }

    /// Register endpoints for a class at process start. Replaces any
    /// prior registration for that class.
    pub async fn register(&self, class: CapabilityClass, endpoints: Vec<ProviderEndpoint>) {
        let mut state = self.state.lock().await;
        state.classes.insert(class, ClassState::new(endpoints));
    }

    /// Round-robin over active endpoints within `class`. Advances the
    /// round-robin index only when a non-nil endpoint is returned.
    pub async fn get_active(&self, class: CapabilityClass) -> Result<ProviderEndpoint, ProviderError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let class_state = state
            .classes
            .get_mut(&class)
            .filter(|c| !c.endpoints.is_empty())
            .ok_or_else(|| ProviderError::NoProviderAvailable {
                class: class.to_string(),
            })?;

        let len = class_state.endpoints.len();
        let start = class_state.current_index % len;

        if class_state.endpoints[start].is_available(now) {
            class_state.endpoints[start].record_use(now);
            return Ok(class_state.endpoints[start].clone());
        }

        for step in 1..len {
            let idx = (start + step) % len;
            if class_state.endpoints[idx].is_available(now) {
                class_state.current_index = idx;
                class_state.endpoints[idx].record_use(now);
                return Ok(class_state.endpoints[idx].clone());
            }
        }

        Err(ProviderError::NoProviderAvailable {
            class: class.to_string(),
        })
    }

    /// Walk the fallback chain for `service`, returning the first class
    /// with a usable endpoint. `resume_after` lets a caller skip classes
    /// it already knows failed upstream.
    pub async fn get_with_fallback(
        &self,
        service: ServiceType,
        resume_after: Option<CapabilityClass>,
    ) -> Result<ProviderEndpoint, ProviderError> {
        let chain = fallback_chain(service);
        let start = match resume_after {
            Some(c) => chain.iter().position(|x| *x == c).map(|i| i + 1).unwrap_or(0),
            None => 0,
        };
        for class in &chain[start..] {
            if let Ok(endpoint) = self.get_active(*class).await {
                return Ok(endpoint);
            }
        }
        Err(ProviderError::NoServiceAvailable {
            service_type: service.to_string(),
        })
    }

    /// Mark an endpoint errored, rotate to the next usable endpoint in
    /// its class, and schedule an asynchronous recovery timer.
    pub async fn mark_error(&self, class: CapabilityClass, name: &str) {
        let mut state = self.state.lock().await;
        if let Some(class_state) = state.classes.get_mut(&class) {
            if let Some((idx, endpoint)) = class_state
                .endpoints
                .iter_mut()
                .enumerate()
                .find(|(_, e)| e.name == name)
            {
                endpoint.mark_error();
                if class_state.endpoints.len() > 1 {
                    class_state.current_index = (idx + 1) % class_state.endpoints.len();
                }
            }
        }
        drop(state);
        self.schedule_recovery(class, name.to_string());
    }

    fn schedule_recovery(&self, class: CapabilityClass, name: String) {
        let state = self.state.clone();
        let delay = self.recovery_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = state.lock().await;
            if let Some(class_state) = state.classes.get_mut(&class) {
                if let Some(endpoint) = class_state.endpoints.iter_mut().find(|e| e.name == name) {
                    endpoint.recover();
                }
            }
        });
    }

    /// Transition an endpoint to rate-limited, either with a supplied
    /// reset instant or `now + 1 minute`.
    pub async fn mark_rate_limited(
        &self,
        class: CapabilityClass,
        name: &str,
        reset_at: Option<chrono::DateTime<Utc>>,
    ) {
        let mut state = self.state.lock().await;
        if let Some(class_state) = state.classes.get_mut(&class) {
            if let Some(endpoint) = class_state.endpoints.iter_mut().find(|e| e.name == name) {
                endpoint.mark_rate_limited(reset_at.unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(1)));
            }
        }
    }

    /// Periodic health check: clear expired rate limits and transition
    /// over-quota endpoints to rate-limited with a fresh reset instant.
    pub async fn health_check(&self) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        for class_state in state.classes.values_mut() {
            for endpoint in class_state.endpoints.iter_mut() {
                if endpoint.status == EndpointStatus::RateLimited {
                    if let Some(reset_at) = endpoint.rate_limit_reset {
                        if now >= reset_at {
                            endpoint.status = EndpointStatus::Active;
                            endpoint.rate_limit_reset = None;
                            endpoint.requests_made_this_window = 0;
                        }
                    }
                }
                if endpoint.status == EndpointStatus::Active
                    && endpoint.requests_made_this_window >= endpoint.max_requests_per_window
                {
                    endpoint.status = EndpointStatus::RateLimited;
                    endpoint.rate_limit_reset = Some(now + chrono::Duration::minutes(1));
                }
            }
        }
    }

    /// Per-class counts of {active, rate-limited, error, offline}.
    pub async fn status_report(&self) -> HashMap<CapabilityClass, ClassCounts> {
        let state = self.state.lock().await;
        let mut report = HashMap::new();
        for (class, class_state) in state.classes.iter() {
            let mut counts = ClassCounts::default();
            for endpoint in &class_state.endpoints {
                match endpoint.status {
                    EndpointStatus::Active => counts.active += 1,
                    EndpointStatus::RateLimited => counts.rate_limited += 1,
                    EndpointStatus::Error => counts.error += 1,
                    EndpointStatus::Offline => counts.offline += 1,
                }
            }
            report.insert(*class, counts);
        }
        report
    }

    /// Whether `class` has at least one endpoint that isn't offline.
    pub async fn class_available(&self, class: CapabilityClass) -> bool {
        let state = self.state.lock().await;
        state
            .classes
            .get(&class)
            .map(|c| c.endpoints.iter().any(|e| e.status != EndpointStatus::Offline))
            .unwrap_or(false)
    }

    /// Force every endpoint in `class` offline. Exposed for tests and
    /// operator-driven maintenance.
    pub async fn take_class_offline(&self, class: CapabilityClass) {
        let mut state = self.state.lock().await;
        if let Some(class_state) = state.classes.get_mut(&class) {
            for endpoint in class_state.endpoints.iter_mut() {
                endpoint.status = EndpointStatus::Offline;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::endpoint::ProviderEndpoint;

    fn two_endpoints(class: CapabilityClass) -> Vec<ProviderEndpoint> {
        vec![
            ProviderEndpoint::new("a", class, "https://a", "key-a"),
            ProviderEndpoint::new("b", class, "https://b", "key-b"),
        ]
    }

    #[tokio::test]
    async fn rotation_liveness_after_error_and_recovery() {
        let registry = ProviderRegistry::new(Duration::from_millis(20));
        registry.register(CapabilityClass::Openai, two_endpoints(CapabilityClass::Openai)).await;

        let first = registry.get_active(CapabilityClass::Openai).await.unwrap();
        assert_eq!(first.name, "a");

        registry.mark_error(CapabilityClass::Openai, "a").await;
        let second = registry.get_active(CapabilityClass::Openai).await.unwrap();
        assert_eq!(second.name, "b");

        tokio::time::sleep(Duration::from_millis(60)).await;
        // "a" should be back in rotation with error_count zeroed.
        let report_before = registry.status_report().await;
        let counts = report_before.get(&CapabilityClass::Openai).unwrap();
        assert_eq!(counts.active, 2);
    }

    #[tokio::test]
    async fn fallback_walks_chain_in_order() {
        let registry = ProviderRegistry::new(Duration::from_secs(60));
        // Only serper (third in the search chain) has endpoints.
        registry
            .register(CapabilityClass::Serper, vec![ProviderEndpoint::new("s", CapabilityClass::Serper, "https://s", "k")])
            .await;

        let endpoint = registry
            .get_with_fallback(ServiceType::Search, None)
            .await
            .unwrap();
        assert_eq!(endpoint.class, CapabilityClass::Serper);
    }

    #[tokio::test]
    async fn fallback_returns_error_when_all_empty() {
        let registry = ProviderRegistry::new(Duration::from_secs(60));
        let result = registry.get_with_fallback(ServiceType::Search, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rate_limit_reentry_zeroes_window() {
        let registry = ProviderRegistry::new(Duration::from_secs(60));
        registry
            .register(CapabilityClass::Exa, vec![ProviderEndpoint::new("e", CapabilityClass::Exa, "https://e", "k")])
            .await;
        let past = Utc::now() - chrono::Duration::seconds(1);
        registry.mark_rate_limited(CapabilityClass::Exa, "e", Some(past)).await;
        let endpoint = registry.get_active(CapabilityClass::Exa).await.unwrap();
        assert_eq!(endpoint.requests_made_this_window, 1);
        assert_eq!(endpoint.status, EndpointStatus::Active);
    }

    #[tokio::test]
    async fn get_active_advances_index_only_on_success() {
        let registry = ProviderRegistry::new(Duration::from_secs(60));
        registry.register(CapabilityClass::Groq, two_endpoints(CapabilityClass::Groq)).await;
        let first = registry.get_active(CapabilityClass::Groq).await.unwrap();
        let second = registry.get_active(CapabilityClass::Groq).await.unwrap();
        assert_eq!(first.name, "a");
        assert_eq!(second.name, "a");
    }

    #[tokio::test]
    async fn health_monotonicity_offline_then_restored() {
        let registry = ProviderRegistry::new(Duration::from_secs(60));
        registry
            .register(CapabilityClass::Tavily, vec![ProviderEndpoint::new("t", CapabilityClass::Tavily, "https://t", "k")])
            .await;
        registry.take_class_offline(CapabilityClass::Tavily).await;
        assert!(!registry.class_available(CapabilityClass::Tavily).await);

        registry.register(CapabilityClass::Tavily, vec![ProviderEndpoint::new("t2", CapabilityClass::Tavily, "https://t", "k")]).await;
        assert!(registry.class_available(CapabilityClass::Tavily).await);
    }
}

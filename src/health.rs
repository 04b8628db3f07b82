//! Health Aggregator: composes the provider registry's per-class status
//! report, the AI adapter's capability-level availability, required
//! credential presence, and artifact-root writability into a single
//! three-valued verdict the caller branches on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ai::AIAdapter;
use crate::artifact_store::ArtifactStore;
use crate::provider::{fallback_chain, CapabilityClass, ClassCounts, ProviderRegistry, ServiceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub provider_status: HashMap<CapabilityClass, ClassCounts>,
    pub ai_availability: HashMap<CapabilityClass, bool>,
    pub missing_credentials: Vec<CapabilityClass>,
    pub artifact_root_writable: bool,
    pub details: Vec<String>,
}

/// Every capability class backing at least one `ServiceType` fallback
/// chain; a class absent from every chain is never load-bearing and its
/// absence is not itself a degradation signal.
fn required_classes() -> Vec<CapabilityClass> {
    let mut seen = std::collections::BTreeSet::new();
    for service in [
        ServiceType::AiModels,
        ServiceType::Search,
        ServiceType::SocialInsights,
        ServiceType::WebScraping,
        ServiceType::ContentExtraction,
    ] {
        for class in fallback_chain(service) {
            seen.insert(*class);
        }
    }
    seen.into_iter().collect()
}

/// Probe the artifact root for writability by creating and removing a
/// throwaway marker file; a root that doesn't exist yet is not itself a
/// failure; `ArtifactStore` creates directories lazily on first write.
fn check_artifact_root_writable(store: &ArtifactStore) -> bool {
    let probe = store.root_path().join(".health_probe");
    if std::fs::create_dir_all(store.root_path()).is_err() {
        return false;
    }
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Compose registry, AI adapter, and filesystem signals into one
/// verdict. `Healthy` requires every required class to have at least
/// one endpoint and the AI adapter to have at least one available
/// class; `Unhealthy` means the artifact root itself can't be written
/// to, or every AI-capable class is unavailable; everything else is
/// `Degraded`.
pub async fn check(registry: &ProviderRegistry, ai: &AIAdapter, store: &ArtifactStore) -> HealthReport {
    let provider_status = registry.status_report().await;
    let ai_availability = ai.availability_report().await;

    let required = required_classes();
    let missing_credentials: Vec<CapabilityClass> = required
        .iter()
        .copied()
        .filter(|class| {
            provider_status
                .get(class)
                .map(|counts| counts.active + counts.rate_limited + counts.error == 0)
                .unwrap_or(true)
        })
        .collect();

    let artifact_root_writable = check_artifact_root_writable(store);
    let any_ai_available = ai_availability.values().any(|available| *available);

    let mut details = Vec::new();
    if !artifact_root_writable {
        details.push("artifact root is not writable".to_string());
    }
    if !any_ai_available {
        details.push("no ai_models capability class is currently available".to_string());
    }
    if !missing_credentials.is_empty() {
        details.push(format!(
            "classes with no configured endpoints: {}",
            missing_credentials.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }

    let status = if !artifact_root_writable || !any_ai_available {
        HealthStatus::Unhealthy
    } else if !missing_credentials.is_empty() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthReport {
        status,
        provider_status,
        ai_availability,
        missing_credentials,
        artifact_root_writable,
        details,
    }
}

//! AI Invocation Adapter: a uniform call surface over the `ai_models`
//! fallback chain, with capability negotiation (tools vs not), priority
//! ordering, and automatic failover on quota/error.
//!
//! The wire format of any given provider's chat/completion endpoint is
//! explicitly out of scope; [`AIBackend`] is the seam a concrete HTTP
//! client plugs into — a thin trait over `reqwest` with typed errors
//! instead of raw `anyhow::Error` bubbling out of the network call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::provider::{CapabilityClass, ProviderEndpoint, ProviderRegistry, ServiceType};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// A tool call emitted by the model mid-generation. Only `search` is
/// defined in the core contract.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub text: String,
    pub tool_call: Option<ToolCall>,
}

/// Failure classification driving the adapter's retry/failover policy.
#[derive(Debug, Clone)]
pub enum BackendError {
    QuotaExceeded(String),
    RateLimited(String),
    NetworkTimeout(String),
    MalformedResponse(String),
    FatalAuth(String),
}

/// The seam a concrete provider HTTP client implements. Swappable in
/// tests for a fake that returns scripted responses without any network
/// access.
#[async_trait]
pub trait AIBackend: Send + Sync {
    async fn invoke(
        &self,
        endpoint: &ProviderEndpoint,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<BackendResponse, BackendError>;
}

/// Whether a capability class's provider is expected to support tool
/// calling. `qwen-compatible`, `gemini`, and `openai` are tools-capable
/// in the current deployment; `groq` and `deepseek` are text-only.
pub fn supports_tools(class: CapabilityClass) -> bool {
    matches!(
        class,
        CapabilityClass::QwenCompatible | CapabilityClass::Gemini | CapabilityClass::Openai
    )
}

/// Something that can execute a `search` tool call on the model's
/// behalf. Implemented by the Search Orchestrator; injected here so the
/// adapter has no direct dependency on Stage 1.
#[async_trait]
pub trait SearchTool: Send + Sync {
    async fn search(&self, query: &str, session: Option<&str>) -> anyhow::Result<String>;
}

struct ProviderAvailability {
    available: bool,
}

/// Priority-ordered, failover-capable AI invocation adapter.
pub struct AIAdapter {
    registry: ProviderRegistry,
    backend: Arc<dyn AIBackend>,
    availability: Mutex<HashMap<CapabilityClass, ProviderAvailability>>,
}

impl AIAdapter {
    pub fn new(registry: ProviderRegistry, backend: Arc<dyn AIBackend>) -> Self {
        let mut availability = HashMap::new();
        for class in crate::provider::fallback_chain(ServiceType::AiModels) {
            availability.insert(*class, ProviderAvailability { available: true });
        }
        Self {
            registry,
            backend,
            availability: Mutex::new(availability),
        }
    }

    /// Reset every class's adapter-level availability flag to `true`.
    pub async fn reset_availability(&self) {
        let mut availability = self.availability.lock().await;
        for state in availability.values_mut() {
            state.available = true;
        }
    }

    async fn is_class_available(&self, class: CapabilityClass) -> bool {
        self.availability
            .lock()
            .await
            .get(&class)
            .map(|s| s.available)
            .unwrap_or(true)
    }

    /// Per-class adapter-level availability, for the health aggregator.
    pub async fn availability_report(&self) -> HashMap<CapabilityClass, bool> {
        self.availability
            .lock()
            .await
            .iter()
            .map(|(class, state)| (*class, state.available))
            .collect()
    }

    async fn mark_unavailable(&self, class: CapabilityClass) {
        let mut availability = self.availability.lock().await;
        availability.entry(class).or_insert(ProviderAvailability { available: true }).available = false;
    }

    #[cfg(test)]
    pub async fn mark_unavailable_for_test(&self, class: CapabilityClass) {
        self.mark_unavailable(class).await
    }

    /// One attempt against a single selected endpoint, applying the
    /// per-failure-kind retry policy before giving up on this provider
    /// and letting the caller fail over.
    async fn call_with_local_retry(
        &self,
        endpoint: &ProviderEndpoint,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<BackendResponse, BackendError> {
        let mut attempt = 0;
        let mut last_err;
        loop {
            match self.backend.invoke(endpoint, prompt, options).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    last_err = err;
                    let retries_left = match &last_err {
                        BackendError::QuotaExceeded(_) | BackendError::FatalAuth(_) => 0,
                        BackendError::RateLimited(_) => 1,
                        BackendError::NetworkTimeout(_) => 2,
                        BackendError::MalformedResponse(_) => 1,
                    };
                    if attempt >= retries_left {
                        return Err(last_err);
                    }
                    if matches!(last_err, BackendError::RateLimited(_)) {
                        tokio::time::sleep(Duration::from_millis(200 * (attempt as u64 + 1))).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Generate text via the highest-priority available provider,
    /// failing over through the `ai_models` chain on recoverable error.
    pub async fn generate_text(&self, prompt: &str, options: &GenerateOptions) -> anyhow::Result<String> {
        self.generate_text_requiring(prompt, options, false).await
    }

    async fn generate_text_requiring(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        require_tools: bool,
    ) -> anyhow::Result<String> {
        let chain = crate::provider::fallback_chain(ServiceType::AiModels);
        for class in chain {
            if require_tools && !supports_tools(*class) {
                continue;
            }
            if !self.is_class_available(*class).await {
                continue;
            }
            let endpoint = match self.registry.get_active(*class).await {
                Ok(endpoint) => endpoint,
                Err(_) => continue,
            };

            match self.call_with_local_retry(&endpoint, prompt, options).await {
                Ok(resp) => return Ok(resp.text),
                Err(BackendError::QuotaExceeded(msg)) => {
                    self.mark_unavailable(*class).await;
                    self.registry.mark_error(*class, &endpoint.name).await;
                    tracing::warn!(class = %class, "ai provider quota exceeded: {msg}");
                }
                Err(BackendError::FatalAuth(msg)) => {
                    self.mark_unavailable(*class).await;
                    self.registry.mark_error(*class, &endpoint.name).await;
                    tracing::error!(class = %class, "ai provider fatal auth failure: {msg}");
                }
                Err(other) => {
                    self.registry.mark_error(*class, &endpoint.name).await;
                    tracing::warn!(class = %class, "ai provider call failed: {other:?}");
                }
            }
        }
        anyhow::bail!("no ai_models provider available to satisfy the request")
    }

    /// Tool-augmented generation. Requires a tools-capable provider; if
    /// none is available, degrades to [`Self::generate_text`] with the
    /// prompt composed from `context` (no tool loop is attempted).
    pub async fn generate_with_active_search(
        &self,
        prompt: &str,
        context: &str,
        session: Option<&str>,
        max_iterations: u32,
        search_tool: &dyn SearchTool,
    ) -> anyhow::Result<String> {
        let chain = crate::provider::fallback_chain(ServiceType::AiModels);
        let mut has_tools_capable = false;
        for class in chain {
            if supports_tools(*class) && self.is_class_available(*class).await {
                has_tools_capable = true;
                break;
            }
        }
        if !has_tools_capable {
            let composed = format!("{context}\n\n{prompt}");
            return self.generate_text(&composed, &GenerateOptions::default()).await;
        }

        let mut working_prompt = format!("{context}\n\n{prompt}");
        for _ in 0..max_iterations {
            let chain = crate::provider::fallback_chain(ServiceType::AiModels);
            let mut responded = None;
            for class in chain {
                if !supports_tools(*class) || !self.is_class_available(*class).await {
                    continue;
                }
                let endpoint = match self.registry.get_active(*class).await {
                    Ok(endpoint) => endpoint,
                    Err(_) => continue,
                };
                match self
                    .call_with_local_retry(&endpoint, &working_prompt, &GenerateOptions::default())
                    .await
                {
                    Ok(resp) => {
                        responded = Some(resp);
                        break;
                    }
                    Err(BackendError::QuotaExceeded(_)) | Err(BackendError::FatalAuth(_)) => {
                        self.mark_unavailable(*class).await;
                        self.registry.mark_error(*class, &endpoint.name).await;
                    }
                    Err(_) => {
                        self.registry.mark_error(*class, &endpoint.name).await;
                    }
                }
            }

            let Some(resp) = responded else {
                anyhow::bail!("no tools-capable ai_models provider available");
            };

            match resp.tool_call {
                Some(tool_call) => {
                    let result = search_tool.search(&tool_call.query, session).await?;
                    working_prompt.push_str(&format!(
                        "\n\n[tool:search query={}]\n{}\n",
                        tool_call.query, result
                    ));
                }
                None => return Ok(resp.text),
            }
        }
        anyhow::bail!("tool loop exceeded max_iterations without a final answer")
    }
}

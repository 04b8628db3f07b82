//! Generic HTTP client implementations of the [`AIBackend`] and
//! [`StreamFetcher`] seams: a `reqwest::Client`, status-code
//! classification, and typed-error mapping. Each provider's actual
//! request/response schema is out of scope here; every call sends a
//! uniform JSON envelope and expects a uniform JSON envelope back,
//! which is enough to exercise the adapter and orchestrator layers
//! against a real HTTP stack.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::ai::{AIBackend, BackendError, BackendResponse, GenerateOptions};
use crate::errors::ProviderError;
use crate::provider::{CapabilityClass, ProviderEndpoint};
use crate::search::orchestrator::StreamFetcher;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpProviderClient {
    client: reqwest::Client,
}

impl HttpProviderClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AIBackend for HttpProviderClient {
    async fn invoke(
        &self,
        endpoint: &ProviderEndpoint,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<BackendResponse, BackendError> {
        let resp = self
            .client
            .post(&endpoint.base_url)
            .bearer_auth(&endpoint.credential)
            .json(&serde_json::json!({ "prompt": prompt, "options": options }))
            .send()
            .await
            .map_err(|err| classify_request_error(&err))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited(format!("{} rate-limited", endpoint.name)));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(BackendError::FatalAuth(format!("{} rejected credentials", endpoint.name)));
        }
        if !status.is_success() {
            return Err(BackendError::NetworkTimeout(format!("{} returned status {status}", endpoint.name)));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|err| BackendError::MalformedResponse(err.to_string()))?;
        let text = body
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::MalformedResponse("response had no \"text\" field".to_string()))?
            .to_string();
        let tool_call = body
            .get("tool_call")
            .and_then(|tc| tc.get("query"))
            .and_then(Value::as_str)
            .map(|query| crate::ai::ToolCall { query: query.to_string() });

        Ok(BackendResponse { text, tool_call })
    }
}

fn classify_request_error(err: &reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::NetworkTimeout(err.to_string())
    } else if err.is_connect() {
        BackendError::NetworkTimeout(err.to_string())
    } else {
        BackendError::MalformedResponse(err.to_string())
    }
}

#[async_trait]
impl StreamFetcher for HttpProviderClient {
    async fn fetch(&self, class: CapabilityClass, query: &str) -> Result<Value, ProviderError> {
        let url = format!("https://api.{}.example/v1/search", class.as_str());
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(|err| ProviderError::Transient {
                class: class.to_string(),
                name: url.clone(),
                message: err.to_string(),
            })?;

        let resp = resp.error_for_status().map_err(|err| ProviderError::Fatal {
            class: class.to_string(),
            name: url.clone(),
            message: err.to_string(),
        })?;

        resp.json::<Value>().await.map_err(|err| ProviderError::Transient {
            class: class.to_string(),
            name: url,
            message: err.to_string(),
        })
    }
}

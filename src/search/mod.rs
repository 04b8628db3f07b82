//! Search Orchestrator (Stage 1): massive multi-provider collection
//! across eight intelligence streams, merged into a `MassiveCorpus`.

pub mod orchestrator;
pub mod variants;

pub use orchestrator::{SearchOrchestrator, StreamFetcher};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::provider::ServiceType;

/// The eight intelligence streams run concurrently in Stage 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Web,
    Social,
    Trend,
    Market,
    Competitor,
    Content,
    Behavioral,
    Predictive,
}

impl StreamKind {
    pub const ALL: [StreamKind; 8] = [
        StreamKind::Web,
        StreamKind::Social,
        StreamKind::Trend,
        StreamKind::Market,
        StreamKind::Competitor,
        StreamKind::Content,
        StreamKind::Behavioral,
        StreamKind::Predictive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Web => "web",
            StreamKind::Social => "social",
            StreamKind::Trend => "trend",
            StreamKind::Market => "market",
            StreamKind::Competitor => "competitor",
            StreamKind::Content => "content",
            StreamKind::Behavioral => "behavioral",
            StreamKind::Predictive => "predictive",
        }
    }

    /// The logical service type a stream draws providers from. This
    /// mapping is an implementation decision the source left implicit;
    /// fixed here so rotation/fallback behavior is deterministic.
    pub fn service_type(self) -> ServiceType {
        match self {
            StreamKind::Web => ServiceType::Search,
            StreamKind::Social => ServiceType::SocialInsights,
            StreamKind::Trend => ServiceType::Search,
            StreamKind::Market => ServiceType::Search,
            StreamKind::Competitor => ServiceType::WebScraping,
            StreamKind::Content => ServiceType::ContentExtraction,
            StreamKind::Behavioral => ServiceType::SocialInsights,
            StreamKind::Predictive => ServiceType::Search,
        }
    }
}

/// A single provider's response to one query variant within a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: String,
    pub content: serde_json::Value,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

/// Per-stream results, keyed by the query variant that produced them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamResult {
    pub variants: BTreeMap<String, Vec<ProviderResult>>,
    pub error: Option<String>,
}

impl StreamResult {
    pub fn result_count(&self) -> usize {
        self.variants.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.result_count() == 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub sources_used: Vec<String>,
    pub total_results: usize,
    pub byte_size: usize,
    pub synthetic_expansion: bool,
}

/// The authoritative Stage-1 output schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassiveCorpus {
    pub session: String,
    pub streams: BTreeMap<StreamKind, StreamResult>,
    pub synthetic_blocks: Vec<serde_json::Value>,
    pub metadata: CollectionMetadata,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl MassiveCorpus {
    pub fn has_any_results(&self) -> bool {
        self.streams.values().any(|s| !s.is_empty())
    }
}

//! Stage 1 algorithm: fan out queries across eight concurrent streams,
//! merge into a `MassiveCorpus`, and expand synthetically to the
//! configured byte floor.
//!
//! Concurrency is bounded by a `tokio::sync::Semaphore` sized to the
//! fixed stream count, so the fan-out never runs more requests in
//! parallel than there are streams to run.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::variants::generate_variants;
use super::{CollectionMetadata, MassiveCorpus, ProviderResult, StreamKind, StreamResult};
use crate::artifact_store::{ArtifactStore, Category};
use crate::brief::Brief;
use crate::errors::{ProviderError, StageError};
use crate::progress::ProgressFabric;
use crate::provider::ProviderRegistry;

const DEFAULT_INTER_REQUEST_DELAY: Duration = Duration::from_millis(500);
const MAX_EXPANSION_ATTEMPTS: usize = 1024;
const MAX_BLOCK_FILLER_BYTES: usize = 8192;
const MIN_BLOCK_FILLER_BYTES: usize = 64;

/// The seam a concrete per-provider HTTP fetch implements; vendor wire
/// details are out of scope, so this trait is the boundary a real
/// client plugs into.
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    async fn fetch(
        &self,
        class: crate::provider::CapabilityClass,
        query: &str,
    ) -> Result<serde_json::Value, ProviderError>;
}

pub struct SearchOrchestrator {
    registry: ProviderRegistry,
    store: ArtifactStore,
    progress: ProgressFabric,
    fetcher: Arc<dyn StreamFetcher>,
    target_bytes: u64,
    inter_request_delay: Duration,
}

impl SearchOrchestrator {
    pub fn new(
        registry: ProviderRegistry,
        store: ArtifactStore,
        progress: ProgressFabric,
        fetcher: Arc<dyn StreamFetcher>,
        target_bytes: u64,
    ) -> Self {
        Self {
            registry,
            store,
            progress,
            fetcher,
            target_bytes,
            inter_request_delay: DEFAULT_INTER_REQUEST_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_inter_request_delay(mut self, delay: Duration) -> Self {
        self.inter_request_delay = delay;
        self
    }

    async fn run_stream(
        &self,
        session: &str,
        kind: StreamKind,
        variants: &[String],
    ) -> StreamResult {
        let endpoint = match self.registry.get_with_fallback(kind.service_type(), None).await {
            Ok(endpoint) => endpoint,
            Err(err) => {
                let _ = self.store.save_error(
                    session,
                    &format!("stream_{}", kind.as_str()),
                    &err.to_string(),
                    &format!("stream={}", kind.as_str()),
                );
                return StreamResult {
                    variants: Default::default(),
                    error: Some(err.to_string()),
                };
            }
        };

        let mut result = StreamResult::default();
        for variant in variants {
            match self.fetcher.fetch(endpoint.class, variant).await {
                Ok(content) => {
                    result.variants.entry(variant.clone()).or_default().push(ProviderResult {
                        provider: endpoint.name.clone(),
                        content,
                        fetched_at: Utc::now(),
                    });
                }
                Err(err) => {
                    self.registry.mark_error(endpoint.class, &endpoint.name).await;
                    tracing::warn!(stream = kind.as_str(), "provider fetch failed: {err}");
                }
            }
            if !self.inter_request_delay.is_zero() {
                tokio::time::sleep(self.inter_request_delay).await;
            }
        }

        let _ = self.store.save_stage(
            session,
            &format!("stream_{}", kind.as_str()),
            &result,
            Category::Collection,
        );
        result
    }

    /// Execute the full Stage-1 algorithm and return the persisted corpus.
    pub async fn run(&self, brief: &Brief, session: &str) -> Result<MassiveCorpus, StageError> {
        self.progress.update(session, 1, "starting massive collection", None).await;

        let variants = generate_variants(brief);
        let semaphore = Arc::new(Semaphore::new(StreamKind::ALL.len()));

        let mut results = std::collections::BTreeMap::new();
        let mut join_set = tokio::task::JoinSet::new();
        for kind in StreamKind::ALL {
            let variants = variants.clone();
            let session = session.to_string();
            let registry = self.registry.clone();
            let store = self.store.clone();
            let progress = self.progress.clone();
            let fetcher = self.fetcher.clone();
            let delay = self.inter_request_delay;
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let sub = SearchOrchestrator {
                    registry,
                    store,
                    progress,
                    fetcher,
                    target_bytes: 0,
                    inter_request_delay: delay,
                };
                let result = sub.run_stream(&session, kind, &variants).await;
                (kind, result)
            });
        }
        while let Some(joined) = join_set.join_next().await {
            let (kind, result) = joined.expect("stream task panicked");
            self.progress
                .update(session, 2, &format!("stream {} complete", kind.as_str()), None)
                .await;
            results.insert(kind, result);
        }

        let sources_used: Vec<String> = results
            .values()
            .flat_map(|r| r.variants.values().flatten().map(|p| p.provider.clone()))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let total_results: usize = results.values().map(|r| r.result_count()).sum();

        let mut corpus = MassiveCorpus {
            session: session.to_string(),
            streams: results,
            synthetic_blocks: Vec::new(),
            metadata: CollectionMetadata {
                sources_used,
                total_results,
                byte_size: 0,
                synthetic_expansion: false,
            },
            created_at: Utc::now(),
        };
        corpus.metadata.byte_size = estimate_byte_size(&corpus);

        if corpus.metadata.byte_size < self.target_bytes as usize {
            expand_synthetically(&mut corpus, self.target_bytes as usize);
        }

        if !corpus.has_any_results() {
            return Err(StageError::Provider(ProviderError::NoServiceAvailable {
                service_type: "all_streams".to_string(),
            }));
        }

        self.progress.update(session, 3, "collection finalized", None).await;
        self.store
            .save_stage(session, "massive_corpus", &corpus, Category::Collection)?;
        Ok(corpus)
    }
}

fn estimate_byte_size(corpus: &MassiveCorpus) -> usize {
    serde_json::to_vec(corpus).map(|b| b.len()).unwrap_or(0)
}

/// Append stable, clearly-labeled padding blocks until the corpus meets
/// its byte-size target or the attempt cap is reached. Each block's
/// filler is sized against the remaining shortfall (bounded by
/// [`MAX_BLOCK_FILLER_BYTES`]) rather than a fixed small constant, so the
/// configured target is actually reachable within the attempt cap
/// instead of asymptotically approached by ~130-byte steps. If the
/// attempt cap is hit before the target is met, that shortfall is logged
/// rather than silently dropped.
fn expand_synthetically(corpus: &mut MassiveCorpus, target_bytes: usize) {
    let mut attempts = 0;
    while estimate_byte_size(corpus) < target_bytes && attempts < MAX_EXPANSION_ATTEMPTS {
        let remaining = target_bytes.saturating_sub(estimate_byte_size(corpus));
        let filler_len = remaining.clamp(MIN_BLOCK_FILLER_BYTES, MAX_BLOCK_FILLER_BYTES);
        corpus.synthetic_blocks.push(serde_json::json!({
            "kind": "synthetic_padding",
            "index": attempts,
            "content_type": ["analysis", "insights", "patterns", "predictions"][attempts % 4],
            "note": "synthetic-expansion: lower-weight context for stage 2",
            "filler": "x".repeat(filler_len),
        }));
        attempts += 1;
    }

    corpus.metadata.synthetic_expansion = !corpus.synthetic_blocks.is_empty();

    let actual_bytes = estimate_byte_size(corpus);
    if actual_bytes < target_bytes {
        tracing::warn!(
            target_bytes,
            actual_bytes,
            attempts,
            "synthetic expansion capped below target byte floor"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CapabilityClass, ProviderEndpoint, ServiceType};
    use tempfile::tempdir;

    struct FakeFetcher;
    #[async_trait]
    impl StreamFetcher for FakeFetcher {
        async fn fetch(&self, _class: CapabilityClass, query: &str) -> Result<serde_json::Value, ProviderError> {
            Ok(serde_json::json!({ "query": query, "snippet": "lorem ipsum" }))
        }
    }

    struct AllFailFetcher;
    #[async_trait]
    impl StreamFetcher for AllFailFetcher {
        async fn fetch(&self, class: CapabilityClass, _query: &str) -> Result<serde_json::Value, ProviderError> {
            Err(ProviderError::Transient {
                class: class.to_string(),
                name: "x".into(),
                message: "boom".into(),
            })
        }
    }

    fn brief() -> Brief {
        Brief {
            segment: "cafe especial".into(),
            product: "curso barista".into(),
            audience: "torrefadores".into(),
            objective: None,
        }
    }

    async fn registry_with_all_streams() -> ProviderRegistry {
        let registry = ProviderRegistry::new(Duration::from_secs(60));
        for service in [
            ServiceType::Search,
            ServiceType::SocialInsights,
            ServiceType::WebScraping,
            ServiceType::ContentExtraction,
        ] {
            let class = crate::provider::fallback_chain(service)[0];
            registry
                .register(class, vec![ProviderEndpoint::new("p", class, "https://x", "k")])
                .await;
        }
        registry
    }

    #[tokio::test]
    async fn run_produces_populated_corpus_with_at_least_one_stream() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let progress = ProgressFabric::new();
        progress.start("s1", 10).await;
        let registry = registry_with_all_streams().await;
        let orchestrator = SearchOrchestrator::new(registry, store, progress, Arc::new(FakeFetcher), 100)
            .with_inter_request_delay(Duration::ZERO);

        let corpus = orchestrator.run(&brief(), "s1").await.unwrap();
        assert!(corpus.has_any_results());
        assert_eq!(corpus.streams.len(), StreamKind::ALL.len());
    }

    #[tokio::test]
    async fn stage1_partial_failure_still_succeeds_with_per_stream_errors() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let progress = ProgressFabric::new();
        progress.start("s1", 10).await;

        // Only register search-chain providers; social/web-scraping/content
        // streams will fail to acquire any endpoint.
        let registry = ProviderRegistry::new(Duration::from_secs(60));
        registry
            .register(
                CapabilityClass::JinaRead,
                vec![ProviderEndpoint::new("p", CapabilityClass::JinaRead, "https://x", "k")],
            )
            .await;

        let orchestrator = SearchOrchestrator::new(registry, store, progress, Arc::new(FakeFetcher), 100)
            .with_inter_request_delay(Duration::ZERO);
        let corpus = orchestrator.run(&brief(), "s1").await.unwrap();

        assert!(corpus.has_any_results());
        let failed_streams: Vec<_> = corpus
            .streams
            .iter()
            .filter(|(_, r)| r.error.is_some())
            .collect();
        assert!(!failed_streams.is_empty());
    }

    #[tokio::test]
    async fn run_fails_when_every_stream_produces_nothing() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let progress = ProgressFabric::new();
        progress.start("s1", 10).await;
        let registry = registry_with_all_streams().await;
        let orchestrator = SearchOrchestrator::new(registry, store, progress, Arc::new(AllFailFetcher), 100)
            .with_inter_request_delay(Duration::ZERO);

        let result = orchestrator.run(&brief(), "s1").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn byte_size_floor_triggers_synthetic_expansion() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let progress = ProgressFabric::new();
        progress.start("s1", 10).await;
        let registry = registry_with_all_streams().await;
        let orchestrator =
            SearchOrchestrator::new(registry, store, progress, Arc::new(FakeFetcher), 1_000_000)
                .with_inter_request_delay(Duration::ZERO);

        let corpus = orchestrator.run(&brief(), "s1").await.unwrap();
        assert!(corpus.metadata.synthetic_expansion);
        assert!(!corpus.synthetic_blocks.is_empty());
    }
}

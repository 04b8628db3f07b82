//! The closed set of third-party capability classes and the logical
//! service types whose fallback chains are built from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single (capability-class, credential) equivalence class. Any
/// endpoint registered under a class is interchangeable for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityClass {
    QwenCompatible,
    Gemini,
    Openai,
    Groq,
    Deepseek,
    JinaRead,
    Exa,
    Serper,
    Serpapi,
    Tavily,
    Supadata,
    Firecrawl,
    Scrapingant,
    Youtube,
    Rapidapi,
}

impl CapabilityClass {
    pub const ALL: [CapabilityClass; 15] = [
        CapabilityClass::QwenCompatible,
        CapabilityClass::Gemini,
        CapabilityClass::Openai,
        CapabilityClass::Groq,
        CapabilityClass::Deepseek,
        CapabilityClass::JinaRead,
        CapabilityClass::Exa,
        CapabilityClass::Serper,
        CapabilityClass::Serpapi,
        CapabilityClass::Tavily,
        CapabilityClass::Supadata,
        CapabilityClass::Firecrawl,
        CapabilityClass::Scrapingant,
        CapabilityClass::Youtube,
        CapabilityClass::Rapidapi,
    ];

    /// The environment-variable prefix used to discover credentials for
    /// this class, e.g. `EXA` for `EXA_API_KEY`.
    pub fn env_prefix(self) -> &'static str {
        match self {
            CapabilityClass::QwenCompatible => "QWEN",
            CapabilityClass::Gemini => "GEMINI",
            CapabilityClass::Openai => "OPENAI",
            CapabilityClass::Groq => "GROQ",
            CapabilityClass::Deepseek => "DEEPSEEK",
            CapabilityClass::JinaRead => "JINA",
            CapabilityClass::Exa => "EXA",
            CapabilityClass::Serper => "SERPER",
            CapabilityClass::Serpapi => "SERPAPI",
            CapabilityClass::Tavily => "TAVILY",
            CapabilityClass::Supadata => "SUPADATA",
            CapabilityClass::Firecrawl => "FIRECRAWL",
            CapabilityClass::Scrapingant => "SCRAPINGANT",
            CapabilityClass::Youtube => "YOUTUBE",
            CapabilityClass::Rapidapi => "RAPIDAPI",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityClass::QwenCompatible => "qwen-compatible",
            CapabilityClass::Gemini => "gemini",
            CapabilityClass::Openai => "openai",
            CapabilityClass::Groq => "groq",
            CapabilityClass::Deepseek => "deepseek",
            CapabilityClass::JinaRead => "jina-read",
            CapabilityClass::Exa => "exa",
            CapabilityClass::Serper => "serper",
            CapabilityClass::Serpapi => "serpapi",
            CapabilityClass::Tavily => "tavily",
            CapabilityClass::Supadata => "supadata",
            CapabilityClass::Firecrawl => "firecrawl",
            CapabilityClass::Scrapingant => "scrapingant",
            CapabilityClass::Youtube => "youtube",
            CapabilityClass::Rapidapi => "rapidapi",
        }
    }
}

impl fmt::Display for CapabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A logical service a caller wants served, resolved through an ordered
/// fallback chain of capability classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    AiModels,
    Search,
    SocialInsights,
    WebScraping,
    ContentExtraction,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::AiModels => "ai_models",
            ServiceType::Search => "search",
            ServiceType::SocialInsights => "social_insights",
            ServiceType::WebScraping => "web_scraping",
            ServiceType::ContentExtraction => "content_extraction",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The ordered sequence of capability classes consulted to satisfy a
/// logical service type. Each entry is a single-class "group"; the
/// design allows groups to contain more than one class but the current
/// deployment's chains are single-class per step.
pub fn fallback_chain(service: ServiceType) -> &'static [CapabilityClass] {
    use CapabilityClass::*;
    match service {
        ServiceType::AiModels => &[QwenCompatible, Gemini, Openai, Groq, Deepseek],
        ServiceType::Search => &[JinaRead, Exa, Serper, Serpapi, Firecrawl, Tavily],
        ServiceType::SocialInsights => &[Supadata, Serper, Serpapi, Firecrawl, Tavily],
        ServiceType::WebScraping => &[Firecrawl, Scrapingant, JinaRead, Serper, Serpapi],
        ServiceType::ContentExtraction => &[Firecrawl, JinaRead, Scrapingant, Serper, Rapidapi],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_chain_matches_declared_order() {
        let chain = fallback_chain(ServiceType::Search);
        assert_eq!(
            chain,
            &[
                CapabilityClass::JinaRead,
                CapabilityClass::Exa,
                CapabilityClass::Serper,
                CapabilityClass::Serpapi,
                CapabilityClass::Firecrawl,
                CapabilityClass::Tavily,
            ]
        );
    }

    #[test]
    fn every_service_type_has_a_non_empty_chain() {
        for service in [
            ServiceType::AiModels,
            ServiceType::Search,
            ServiceType::SocialInsights,
            ServiceType::WebScraping,
            ServiceType::ContentExtraction,
        ] {
            assert!(!fallback_chain(service).is_empty());
        }
    }

    #[test]
    fn env_prefix_is_unique_per_class() {
        let mut prefixes: Vec<&str> = CapabilityClass::ALL.iter().map(|c| c.env_prefix()).collect();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), CapabilityClass::ALL.len());
    }
}

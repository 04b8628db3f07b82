//! Query-variant fan-out: expands a brief into the primary query plus a
//! bounded family of per-niche, per-audience, long-tail, semantic, and
//! temporal variants.

use regex::Regex;
use std::sync::LazyLock;

use crate::brief::Brief;

const MAX_VARIANTS: usize = 40;

/// Collapses runs of whitespace left behind when a brief field is empty
/// or carries its own leading/trailing spaces.
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static pattern"));

fn normalize(raw: &str) -> String {
    WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

const TEMPORAL_FORMS: &[&str] = &["2024", "2025", "tendencias", "novidades"];
const LONG_TAIL_PREFIXES: &[&str] = &["como", "melhor", "guia de", "estrategia de"];
const SEMANTIC_SYNONYMS: &[&str] = &["mercado de", "nicho de", "segmento de"];

/// The primary query plus its fan-out, deduplicated and capped at
/// [`MAX_VARIANTS`].
pub fn generate_variants(brief: &Brief) -> Vec<String> {
    let primary = format!("{} {} {}", brief.product, brief.segment, brief.audience);
    let mut variants = vec![primary.clone()];

    // Per-niche combination.
    variants.push(format!("{} para {}", brief.product, brief.segment));
    // Per-audience combination.
    variants.push(format!("{} para {}", brief.product, brief.audience));

    for prefix in LONG_TAIL_PREFIXES {
        variants.push(format!("{prefix} {} {}", brief.product, brief.segment));
    }
    for synonym in SEMANTIC_SYNONYMS {
        variants.push(format!("{synonym} {}", brief.segment));
    }
    for form in TEMPORAL_FORMS {
        variants.push(format!("{} {} {form}", brief.product, brief.segment));
    }
    if let Some(objective) = &brief.objective {
        variants.push(format!("{primary} {objective}"));
    }

    let mut variants: Vec<String> = variants.iter().map(|v| normalize(v)).collect();
    let mut seen = std::collections::HashSet::new();
    variants.retain(|v| seen.insert(v.clone()));
    variants.truncate(MAX_VARIANTS);
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief() -> Brief {
        Brief {
            segment: "cafe especial".into(),
            product: "curso barista".into(),
            audience: "pequenos torrefadores".into(),
            objective: None,
        }
    }

    #[test]
    fn generates_a_bounded_non_trivial_set_of_variants() {
        let variants = generate_variants(&brief());
        assert!(variants.len() > 5);
        assert!(variants.len() <= MAX_VARIANTS);
        assert_eq!(variants[0], "curso barista cafe especial pequenos torrefadores");
    }

    #[test]
    fn variants_are_deduplicated() {
        let variants = generate_variants(&brief());
        let mut seen = std::collections::HashSet::new();
        assert!(variants.iter().all(|v| seen.insert(v.clone())));
    }

    #[test]
    fn objective_appends_an_extra_variant_when_present() {
        let mut b = brief();
        b.objective = Some("reduzir churn".into());
        let with_objective = generate_variants(&b);
        let without_objective = generate_variants(&brief());
        assert_eq!(with_objective.len(), without_objective.len() + 1);
    }
}

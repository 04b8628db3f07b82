//! Stage 3 algorithm.

use super::modules::{title_for, MODULE_ORDER};
use super::{CompilationStats, FinalReport};
use crate::artifact_store::{ArtifactStore, Category, ModuleContent};
use crate::errors::StageError;

const CHARS_PER_PAGE: usize = 2000;
const MIN_PAGES: usize = 1;

pub struct ReportCompiler {
    store: ArtifactStore,
}

impl ReportCompiler {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    fn render_json_module(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(k, v)| format!("**{k}**: {}", render_scalar(v)))
                .collect::<Vec<_>>()
                .join("\n\n"),
            other => format!("```json\n{}\n```", serde_json::to_string_pretty(other).unwrap_or_default()),
        }
    }

    /// Walk the fixed module order, assembling the final Markdown
    /// document. Reading the session directory itself (not an
    /// individual module) is the only fatal failure mode here.
    pub fn compile(&self, session: &str) -> Result<FinalReport, StageError> {
        // Reading the session directory itself is the only fatal path;
        // individual missing/malformed modules are never fatal.
        self.store.list_stage_files(session)?;

        let mut toc_lines = Vec::new();
        let mut present_modules = Vec::new();
        for &name in MODULE_ORDER {
            let present = self.store.load_module(name, session).is_some();
            let marker = if present { "x" } else { " " };
            toc_lines.push(format!("- [{marker}] {}", title_for(name)));
            if present {
                present_modules.push(name);
            }
        }

        let mut body = String::new();
        body.push_str(&format!("# Market Analysis Report\n\nSession: {session}\n\n"));
        body.push_str("## Table of Contents\n\n");
        body.push_str(&toc_lines.join("\n"));
        body.push_str("\n\n");

        let screenshots = self.list_visual_evidence(session);
        if !screenshots.is_empty() {
            body.push_str("## Visual Evidence\n\n");
            for shot in &screenshots {
                body.push_str(&format!("- {shot}\n"));
            }
            body.push('\n');
        }

        for &name in MODULE_ORDER {
            let Some(content) = self.store.load_module(name, session) else {
                continue;
            };
            body.push_str(&format!("## {}\n\n", title_for(name)));
            match content {
                ModuleContent::Markdown(text) => body.push_str(&text),
                ModuleContent::Json(value) => body.push_str(&Self::render_json_module(&value)),
            }
            body.push_str("\n\n");
        }

        let modules_compiled = present_modules.len();
        let modules_expected = MODULE_ORDER.len();
        let success_rate = modules_compiled as f64 / modules_expected as f64;
        let total_chars = body.len();
        let estimated_pages = total_chars.div_ceil(CHARS_PER_PAGE).max(MIN_PAGES);

        body.push_str(&format!(
            "## Statistics\n\nModules compiled: {modules_compiled}/{modules_expected}\nSuccess rate: {:.1}%\nEstimated pages: {estimated_pages}\n",
            success_rate * 100.0
        ));

        let markdown = body;
        let total_chars = markdown.len();

        let stats = CompilationStats {
            modules_compiled,
            modules_expected,
            success_rate,
            total_chars,
            estimated_pages,
        };

        let report = FinalReport {
            session: session.to_string(),
            markdown: markdown.clone(),
            stats,
            created_at: chrono::Utc::now(),
        };

        self.store.save_final_report(session, &markdown)?;
        self.store
            .save_stage(session, "final_report_meta", &report, Category::Report)?;
        Ok(report)
    }

    fn list_visual_evidence(&self, _session: &str) -> Vec<String> {
        // Screenshot capture is out of scope for this core; the section
        // is emitted only when evidence artifacts are actually present.
        Vec::new()
    }
}

fn render_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn toc_lists_every_module_in_declared_order_with_presence_markers() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store
            .save_module("avatars", ModuleContent::Markdown("# Avatars\ncontent".into()), Some("s1"))
            .unwrap();

        let compiler = ReportCompiler::new(store);
        let report = compiler.compile("s1").unwrap();

        assert!(report.markdown.contains("- [x] Avatars"));
        assert!(report.markdown.contains("- [ ] Anti Objecao"));
        assert_eq!(report.stats.modules_compiled, 1);
        assert_eq!(report.stats.modules_expected, MODULE_ORDER.len());
    }

    #[test]
    fn total_chars_matches_emitted_document_byte_length() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store
            .save_module("avatars", ModuleContent::Markdown("content".into()), Some("s1"))
            .unwrap();
        let compiler = ReportCompiler::new(store);
        let report = compiler.compile("s1").unwrap();
        assert_eq!(report.stats.total_chars, report.markdown.len());
    }

    #[test]
    fn missing_modules_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let compiler = ReportCompiler::new(store);
        let report = compiler.compile("empty_session").unwrap();
        assert_eq!(report.stats.modules_compiled, 0);
    }

    #[test]
    fn json_module_renders_via_structural_formatter() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store
            .save_module(
                "palavras_chave",
                ModuleContent::Json(serde_json::json!({"top_keyword": "cafe especial"})),
                Some("s1"),
            )
            .unwrap();
        let compiler = ReportCompiler::new(store);
        let report = compiler.compile("s1").unwrap();
        assert!(report.markdown.contains("top_keyword"));
        assert!(report.markdown.contains("cafe especial"));
    }

    #[test]
    fn final_report_file_written_to_fixed_path() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let compiler = ReportCompiler::new(store);
        compiler.compile("s1").unwrap();
        assert!(dir.path().join("reports/s1/final_report.md").exists());
    }
}

//! Report Compiler (Stage 3): loads module artifacts by the declared
//! module order and concatenates them into a single Markdown document.

pub mod compiler;
pub mod modules;

pub use compiler::ReportCompiler;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationStats {
    pub modules_compiled: usize,
    pub modules_expected: usize,
    pub success_rate: f64,
    pub total_chars: usize,
    pub estimated_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub session: String,
    pub markdown: String,
    pub stats: CompilationStats,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

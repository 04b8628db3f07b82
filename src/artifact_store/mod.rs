//! Durable, timestamped persistence of every stage/sub-stage payload,
//! organized by session: JSON-file-per-artifact persistence under a
//! category/session/sub-stage directory layout, with a latest-wins
//! write and no append-log to replay.

pub mod sanitize;

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ArtifactError;
use crate::util::file_timestamp;

/// Artifact categories. `Module` is handled by a parallel, non-timestamped
/// tree (see [`ArtifactStore::save_module`]) since the Report Compiler
/// needs the *current* content of a named module, not its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Collection,
    Expertise,
    Report,
    Error,
    Progress,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Collection => "collection",
            Category::Expertise => "expertise",
            Category::Report => "report",
            Category::Error => "error",
            Category::Progress => "progress",
        }
    }

    const ALL: [Category; 5] = [
        Category::Collection,
        Category::Expertise,
        Category::Report,
        Category::Error,
        Category::Progress,
    ];
}

/// Content for a named module artifact consumed by the Report Compiler.
pub enum ModuleContent {
    Markdown(String),
    Json(Value),
}

#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    fn ensure_dir(&self, dir: &Path) -> Result<(), ArtifactError> {
        if dir.exists() {
            return Ok(());
        }
        // Retry once before propagating, per the design's directory-creation policy.
        match std::fs::create_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(_) => std::fs::create_dir_all(dir).map_err(|source| ArtifactError::DirCreateFailed {
                path: dir.to_path_buf(),
                source,
            }),
        }
    }

    /// Write `payload` to `<root>/<category>/<session>/<sub_stage>_<ts>.json`,
    /// plus a backup copy under a `.backups` sibling directory. Never
    /// fails due to a non-serializable payload — it degrades to a
    /// placeholder and still persists that placeholder.
    pub fn save_stage<T: Serialize>(
        &self,
        session: &str,
        sub_stage_name: &str,
        payload: &T,
        category: Category,
    ) -> Result<PathBuf, ArtifactError> {
        let (value, _degraded) = sanitize::to_stored_value(payload, sanitize::DEFAULT_MAX_DEPTH);
        self.save_stage_value(session, sub_stage_name, &value, category)
    }

    /// Same as [`Self::save_stage`] but for a payload that is already a
    /// sanitized [`Value`] (e.g. produced via [`sanitize::sanitize_graph`]).
    pub fn save_stage_value(
        &self,
        session: &str,
        sub_stage_name: &str,
        value: &Value,
        category: Category,
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.root.join(category.as_str()).join(session);
        self.ensure_dir(&dir)?;
        let backup_dir = dir.join(".backups");
        self.ensure_dir(&backup_dir)?;

        let ts = file_timestamp();
        let filename = format!("{sub_stage_name}_{ts}.json");
        let path = dir.join(&filename);
        let backup_path = backup_dir.join(&filename);

        let bytes = serde_json::to_vec_pretty(value)?;
        atomic_write(&path, &bytes)?;
        atomic_write(&backup_path, &bytes)?;
        Ok(path)
    }

    /// Write an error record under the parallel error tree.
    pub fn save_error(
        &self,
        session: &str,
        name: &str,
        error: &str,
        context: &str,
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.root.join("errors").join(session);
        self.ensure_dir(&dir)?;
        let ts = file_timestamp();
        let path = dir.join(format!("ERR_{name}_{ts}.txt"));
        let body = format!("type: {name}\nmessage: {error}\ncontext: {context}\n");
        atomic_write(&path, body.as_bytes())?;
        Ok(path)
    }

    /// Write a named module artifact into the module-specific tree used
    /// by the Report Compiler. Overwrites any prior content for that
    /// module name (the compiler only ever wants the current content).
    pub fn save_module(
        &self,
        module_name: &str,
        content: ModuleContent,
        session: Option<&str>,
    ) -> Result<PathBuf, ArtifactError> {
        let session = session.unwrap_or("_global");
        let dir = self.root.join("modules").join(session);
        self.ensure_dir(&dir)?;
        let (path, bytes) = match content {
            ModuleContent::Markdown(text) => (dir.join(format!("{module_name}.md")), text.into_bytes()),
            ModuleContent::Json(value) => (
                dir.join(format!("{module_name}.json")),
                serde_json::to_vec_pretty(&value)?,
            ),
        };
        atomic_write(&path, &bytes)?;
        Ok(path)
    }

    /// Load the content of a module by name, markdown first then JSON,
    /// rendered to a string either way (JSON modules are embedded
    /// verbatim for the caller to render).
    pub fn load_module(&self, module_name: &str, session: &str) -> Option<ModuleContent> {
        let dir = self.root.join("modules").join(session);
        let md_path = dir.join(format!("{module_name}.md"));
        if let Ok(text) = std::fs::read_to_string(&md_path) {
            if !text.trim().is_empty() {
                return Some(ModuleContent::Markdown(text));
            }
        }
        let json_path = dir.join(format!("{module_name}.json"));
        if let Ok(text) = std::fs::read_to_string(&json_path) {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                return Some(ModuleContent::Json(value));
            }
        }
        None
    }

    /// Enumerate `{sub_stage_name -> path}` across all categories for a
    /// session, latest-wins on timestamp when a sub-stage was written
    /// more than once.
    pub fn list_stage_files(&self, session: &str) -> Result<BTreeMap<String, PathBuf>, ArtifactError> {
        let mut latest: BTreeMap<String, (String, PathBuf)> = BTreeMap::new();

        for category in Category::ALL {
            let dir = self.root.join(category.as_str()).join(session);
            if !dir.exists() {
                continue;
            }
            let entries = std::fs::read_dir(&dir).map_err(|source| ArtifactError::SessionDirUnreadable {
                path: dir.clone(),
                source,
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let Some((sub_stage, ts)) = stem.rsplit_once('_').and_then(|(name, _ms)| {
                    // filenames are `<sub_stage>_<yyyymmdd>_<hhmmss>_<mmm>`; the
                    // timestamp is the trailing three underscore-joined groups.
                    let parts: Vec<&str> = stem.rsplitn(4, '_').collect();
                    if parts.len() == 4 {
                        Some((parts[3].to_string(), format!("{}_{}_{}", parts[2], parts[1], parts[0])))
                    } else {
                        None
                    }
                }) else {
                    continue;
                };
                let should_replace = latest.get(&sub_stage).map(|(prev_ts, _)| ts > *prev_ts).unwrap_or(true);
                if should_replace {
                    latest.insert(sub_stage, (ts, path));
                }
            }
        }

        Ok(latest.into_iter().map(|(k, (_, v))| (k, v)).collect())
    }

    /// Re-read the latest artifact for `(session, sub_stage_name)`.
    pub fn load_stage(&self, session: &str, sub_stage_name: &str) -> Result<Value, ArtifactError> {
        let files = self.list_stage_files(session)?;
        let path = files.get(sub_stage_name).ok_or_else(|| ArtifactError::NotFound {
            session: session.to_string(),
            sub_stage: sub_stage_name.to_string(),
        })?;
        let text = std::fs::read_to_string(path).map_err(|source| ArtifactError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the Stage-3 output to the fixed `reports/<session>/final_report.md`
    /// location in the on-disk contract.
    pub fn save_final_report(&self, session: &str, markdown: &str) -> Result<PathBuf, ArtifactError> {
        let dir = self.root.join("reports").join(session);
        self.ensure_dir(&dir)?;
        let path = dir.join("final_report.md");
        atomic_write(&path, markdown.as_bytes())?;
        Ok(path)
    }

    /// Remove artifacts older than `older_than`, returning the count
    /// removed. Safe to call repeatedly; a second call with no
    /// intervening writes removes nothing.
    pub fn cleanup(&self, older_than: Duration) -> Result<usize, ArtifactError> {
        if !self.root.exists() {
            return Ok(0);
        }
        let cutoff = std::time::SystemTime::now() - older_than;
        let mut removed = 0usize;
        remove_stale_files(&self.root, cutoff, &mut removed)?;
        Ok(removed)
    }
}

fn remove_stale_files(dir: &Path, cutoff: std::time::SystemTime, removed: &mut usize) -> Result<(), ArtifactError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_stale_files(&path, cutoff, removed)?;
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if let Ok(modified) = meta.modified() {
                if modified < cutoff {
                    if std::fs::remove_file(&path).is_ok() {
                        *removed += 1;
                    }
                }
            }
        }
    }
    Ok(())
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, bytes).map_err(|source| ArtifactError::WriteFailed {
        path: tmp_path.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| ArtifactError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

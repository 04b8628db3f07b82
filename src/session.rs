//! Session data model and on-disk session directory (`sessions/{active,
//! completed, metadata}`), tracking per-stage completion so a session
//! can be resumed from whichever stage last finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::brief::Brief;
use crate::errors::ArtifactError;
use crate::util::new_session_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub brief: Brief,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub current_stage: u8,
    pub completed_stages: Vec<u8>,
    pub failed_stages: Vec<u8>,
    /// Wall-clock seconds spent in each stage, keyed by stage number.
    pub execution_times: BTreeMap<u8, f64>,
}

impl Session {
    pub fn new(brief: Brief) -> Self {
        let now = Utc::now();
        Self {
            id: new_session_id(),
            brief,
            created_at: now,
            last_updated_at: now,
            status: SessionStatus::Active,
            current_stage: 1,
            completed_stages: Vec::new(),
            failed_stages: Vec::new(),
            execution_times: BTreeMap::new(),
        }
    }

    pub fn mark_stage_started(&mut self, stage: u8) {
        self.current_stage = stage;
        self.last_updated_at = Utc::now();
    }

    pub fn mark_stage_completed(&mut self, stage: u8, elapsed_secs: f64) {
        if !self.completed_stages.contains(&stage) {
            self.completed_stages.push(stage);
        }
        self.failed_stages.retain(|s| *s != stage);
        self.execution_times.insert(stage, elapsed_secs);
        self.last_updated_at = Utc::now();
    }

    pub fn mark_stage_failed(&mut self, stage: u8) {
        if !self.failed_stages.contains(&stage) {
            self.failed_stages.push(stage);
        }
        self.status = SessionStatus::Failed;
        self.last_updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.status = SessionStatus::Completed;
        self.last_updated_at = Utc::now();
    }
}

/// Manages the `sessions/{active,completed,metadata}` directory tree.
#[derive(Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            root: artifact_root.into(),
        }
    }

    fn active_path(&self, id: &str) -> PathBuf {
        self.root.join("sessions").join("active").join(format!("{id}.json"))
    }

    fn completed_path(&self, id: &str) -> PathBuf {
        self.root.join("sessions").join("completed").join(format!("{id}.json"))
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.root.join("sessions").join("metadata").join(format!("{id}.json"))
    }

    fn write_json(&self, path: &PathBuf, session: &Session) -> Result<(), ArtifactError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ArtifactError::DirCreateFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let bytes = serde_json::to_vec_pretty(session)?;
        std::fs::write(path, bytes).map_err(|source| ArtifactError::WriteFailed {
            path: path.clone(),
            source,
        })
    }

    /// Persist a newly created or updated session to `sessions/active/`,
    /// plus a lightweight metadata mirror for fast listing.
    pub fn save_active(&self, session: &Session) -> Result<(), ArtifactError> {
        self.write_json(&self.active_path(&session.id), session)?;
        self.write_json(&self.metadata_path(&session.id), session)?;
        Ok(())
    }

    /// Move a session from `active/` to `completed/`, leaving the
    /// metadata mirror in place so history stays queryable by id.
    pub fn finalize(&self, session: &Session) -> Result<(), ArtifactError> {
        self.write_json(&self.completed_path(&session.id), session)?;
        self.write_json(&self.metadata_path(&session.id), session)?;
        let active = self.active_path(&session.id);
        if active.exists() {
            std::fs::remove_file(&active).map_err(|source| ArtifactError::WriteFailed {
                path: active,
                source,
            })?;
        }
        Ok(())
    }

    fn load_from(&self, path: &PathBuf) -> Result<Session, ArtifactError> {
        let text = std::fs::read_to_string(path).map_err(|source| ArtifactError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load a session, checking `active/` first then `completed/`.
    pub fn load(&self, id: &str) -> Result<Session, ArtifactError> {
        let active = self.active_path(id);
        if active.exists() {
            return self.load_from(&active);
        }
        let completed = self.completed_path(id);
        if completed.exists() {
            return self.load_from(&completed);
        }
        Err(ArtifactError::NotFound {
            session: id.to_string(),
            sub_stage: "session".to_string(),
        })
    }

    /// List every known session id, newest first, from the metadata tree.
    pub fn list_ids(&self) -> Result<Vec<String>, ArtifactError> {
        let dir = self.root.join("sessions").join("metadata");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = std::fs::read_dir(&dir)
            .map_err(|source| ArtifactError::SessionDirUnreadable {
                path: dir.clone(),
                source,
            })?
            .flatten()
            .filter_map(|entry| {
                entry
                    .path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_string())
            })
            .collect();
        ids.sort();
        ids.reverse();
        Ok(ids)
    }

    /// Remove every on-disk record of a session: `active/`, `completed/`,
    /// and its metadata mirror. Idempotent: deleting an id that is
    /// already gone from one or more of the three trees is not an error.
    pub fn delete(&self, id: &str) -> Result<(), ArtifactError> {
        for path in [self.active_path(id), self.completed_path(id), self.metadata_path(id)] {
            if path.exists() {
                std::fs::remove_file(&path).map_err(|source| ArtifactError::WriteFailed { path, source })?;
            }
        }
        Ok(())
    }

    /// Remove sessions in `completed/` older than `max_age_days`, leaving
    /// the metadata mirror intact. Idempotent: a second run with no
    /// newly-stale sessions deletes nothing.
    pub fn cleanup(&self, max_age_days: u64) -> Result<usize, ArtifactError> {
        let dir = self.root.join("sessions").join("completed");
        if !dir.exists() {
            return Ok(0);
        }
        let cutoff = std::time::SystemTime::now() - std::time::Duration::from_secs(max_age_days * 86_400);
        let mut removed = 0usize;
        for entry in std::fs::read_dir(&dir)
            .map_err(|source| ArtifactError::SessionDirUnreadable { path: dir.clone(), source })?
            .flatten()
        {
            let path = entry.path();
            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    if modified < cutoff && std::fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn brief() -> Brief {
        Brief {
            segment: "fintech".into(),
            product: "budgeting app".into(),
            audience: "gen z".into(),
            objective: None,
        }
    }

    #[test]
    fn new_session_starts_active_at_stage_one() {
        let session = Session::new(brief());
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.current_stage, 1);
        assert!(session.completed_stages.is_empty());
    }

    #[test]
    fn stage_completion_updates_times_and_clears_failure() {
        let mut session = Session::new(brief());
        session.mark_stage_failed(2);
        session.mark_stage_completed(2, 12.5);
        assert!(session.completed_stages.contains(&2));
        assert!(!session.failed_stages.contains(&2));
        assert_eq!(session.execution_times.get(&2), Some(&12.5));
    }

    #[test]
    fn save_load_round_trip_via_active() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = Session::new(brief());
        store.save_active(&session).unwrap();

        let loaded = store.load(&session.id).unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.brief.segment, "fintech");
    }

    #[test]
    fn finalize_moves_session_from_active_to_completed() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = Session::new(brief());
        store.save_active(&session).unwrap();

        session.mark_completed();
        store.finalize(&session).unwrap();

        assert!(!store.active_path(&session.id).exists());
        assert!(store.completed_path(&session.id).exists());
        let loaded = store.load(&session.id).unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
    }

    #[test]
    fn delete_removes_a_session_from_every_tree() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = Session::new(brief());
        store.save_active(&session).unwrap();

        store.delete(&session.id).unwrap();

        assert!(!store.active_path(&session.id).exists());
        assert!(!store.metadata_path(&session.id).exists());
        assert!(store.load(&session.id).is_err());
    }

    #[test]
    fn delete_is_idempotent_for_an_unknown_id() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.delete("never-existed").is_ok());
    }

    #[test]
    fn list_ids_reflects_metadata_tree() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let s1 = Session::new(brief());
        let s2 = Session::new(brief());
        store.save_active(&s1).unwrap();
        store.save_active(&s2).unwrap();

        let ids = store.list_ids().unwrap();
        assert!(ids.contains(&s1.id));
        assert!(ids.contains(&s2.id));
    }
}

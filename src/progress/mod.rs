//! Progress Fabric: per-session step/message state with a timestamped
//! log tail and a bounded update queue for polling clients.
//!
//! Updates accumulate in a bounded `VecDeque` per session and are
//! handed to a poller via `drain_updates`; there is no HTTP surface
//! here, just the in-process ring-buffer-plus-drain state a control
//! surface would sit on top of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const LOG_TAIL_CAPACITY: usize = 50;
const UPDATE_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_TOTAL_STEPS: u32 = 13;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub step: u32,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// A single snapshot enqueued for pollers: step/message/ETA shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub session: String,
    pub step: u32,
    pub total_steps: u32,
    pub message: String,
    pub elapsed_secs: f64,
    pub estimated_remaining_secs: Option<f64>,
    pub complete: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ProgressSession {
    step: u32,
    total_steps: u32,
    started_at: DateTime<Utc>,
    last_update_at: DateTime<Utc>,
    message: String,
    log_tail: VecDeque<LogEntry>,
    queue: VecDeque<ProgressSnapshot>,
    active: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl ProgressSession {
    fn new(total_steps: u32) -> Self {
        let now = Utc::now();
        Self {
            step: 0,
            total_steps,
            started_at: now,
            last_update_at: now,
            message: String::new(),
            log_tail: VecDeque::with_capacity(LOG_TAIL_CAPACITY),
            queue: VecDeque::with_capacity(UPDATE_QUEUE_CAPACITY),
            active: true,
            completed_at: None,
        }
    }

    fn push_log(&mut self, entry: LogEntry) {
        if self.log_tail.len() >= LOG_TAIL_CAPACITY {
            self.log_tail.pop_front();
        }
        self.log_tail.push_back(entry);
    }

    fn push_snapshot(&mut self, snapshot: ProgressSnapshot) {
        if self.queue.len() >= UPDATE_QUEUE_CAPACITY {
            self.queue.pop_front();
        }
        self.queue.push_back(snapshot);
    }
}

/// Snapshot returned to direct pollers via [`ProgressFabric::get_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusView {
    pub session: String,
    pub step: u32,
    pub total_steps: u32,
    pub message: String,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    pub last_update_at: DateTime<Utc>,
    pub log_tail: Vec<LogEntry>,
}

struct FabricState {
    sessions: HashMap<String, ProgressSession>,
}

/// Process-wide progress fabric. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ProgressFabric {
    state: Arc<RwLock<FabricState>>,
}

impl Default for ProgressFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressFabric {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(FabricState {
                sessions: HashMap::new(),
            })),
        }
    }

    /// Create (or replace) the progress record for `session`.
    pub async fn start(&self, session: &str, total_steps: u32) {
        let mut state = self.state.write().await;
        state.sessions.insert(session.to_string(), ProgressSession::new(total_steps));
    }

    /// Record a step update, appending to the log tail and enqueuing a
    /// snapshot for pollers. No-op (but still logs via `tracing`) if the
    /// session was never started.
    pub async fn update(&self, session: &str, step: u32, message: &str, detail: Option<serde_json::Value>) {
        let mut state = self.state.write().await;
        let Some(progress) = state.sessions.get_mut(session) else {
            tracing::warn!(session, "progress update for unknown session dropped");
            return;
        };

        let now = Utc::now();
        progress.step = step;
        progress.message = message.to_string();
        progress.last_update_at = now;
        progress.push_log(LogEntry {
            step,
            message: message.to_string(),
            detail,
            timestamp: now,
        });

        let elapsed = (now - progress.started_at).num_milliseconds() as f64 / 1000.0;
        let estimated_remaining_secs = if step > 0 && step < progress.total_steps {
            let per_step = elapsed / step as f64;
            Some((per_step * progress.total_steps as f64 - elapsed).max(0.0))
        } else {
            None
        };

        progress.push_snapshot(ProgressSnapshot {
            session: session.to_string(),
            step,
            total_steps: progress.total_steps,
            message: message.to_string(),
            elapsed_secs: elapsed,
            estimated_remaining_secs,
            complete: false,
            timestamp: now,
        });
    }

    /// Mark a session complete; it is evicted after `grace_period` (the
    /// caller is expected to invoke [`Self::cleanup`] periodically, e.g.
    /// from the health-check tick).
    pub async fn complete(&self, session: &str) {
        let mut state = self.state.write().await;
        let Some(progress) = state.sessions.get_mut(session) else {
            return;
        };
        let now = Utc::now();
        progress.active = false;
        progress.completed_at = Some(now);
        progress.last_update_at = now;
        progress.push_snapshot(ProgressSnapshot {
            session: session.to_string(),
            step: progress.total_steps,
            total_steps: progress.total_steps,
            message: "complete".to_string(),
            elapsed_secs: (now - progress.started_at).num_milliseconds() as f64 / 1000.0,
            estimated_remaining_secs: Some(0.0),
            complete: true,
            timestamp: now,
        });
    }

    pub async fn get_status(&self, session: &str) -> Option<StatusView> {
        let state = self.state.read().await;
        state.sessions.get(session).map(|p| StatusView {
            session: session.to_string(),
            step: p.step,
            total_steps: p.total_steps,
            message: p.message.clone(),
            active: p.active,
            started_at: p.started_at,
            last_update_at: p.last_update_at,
            log_tail: p.log_tail.iter().cloned().collect(),
        })
    }

    /// Pop up to `max` snapshots from the session's queue, in issue order.
    pub async fn drain_updates(&self, session: &str, max: usize) -> Vec<ProgressSnapshot> {
        let mut state = self.state.write().await;
        let Some(progress) = state.sessions.get_mut(session) else {
            return Vec::new();
        };
        let take = max.min(progress.queue.len());
        progress.queue.drain(..take).collect()
    }

    pub async fn list_active(&self) -> Vec<String> {
        let state = self.state.read().await;
        state
            .sessions
            .iter()
            .filter(|(_, p)| p.active)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Evict completed sessions whose completion is older than `max_age`.
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let before = state.sessions.len();
        state.sessions.retain(|_, p| match p.completed_at {
            Some(completed_at) => {
                (now - completed_at).num_milliseconds() < max_age.as_millis() as i64
            }
            None => true,
        });
        before - state.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn progress_ordering_is_non_decreasing_per_session() {
        let fabric = ProgressFabric::new();
        fabric.start("s1", 5).await;
        for step in 1..=5 {
            fabric.update("s1", step, &format!("step {step}"), None).await;
        }
        let drained = fabric.drain_updates("s1", 50).await;
        let steps: Vec<u32> = drained.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
        for w in steps.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[tokio::test]
    async fn complete_emits_terminal_snapshot_and_marks_inactive() {
        let fabric = ProgressFabric::new();
        fabric.start("s1", 3).await;
        fabric.update("s1", 3, "done", None).await;
        fabric.complete("s1").await;

        let status = fabric.get_status("s1").await.unwrap();
        assert!(!status.active);

        let drained = fabric.drain_updates("s1", 50).await;
        assert!(drained.last().unwrap().complete);
    }

    #[tokio::test]
    async fn update_for_unknown_session_is_a_no_op() {
        let fabric = ProgressFabric::new();
        fabric.update("ghost", 1, "hi", None).await;
        assert!(fabric.get_status("ghost").await.is_none());
    }

    #[tokio::test]
    async fn drain_updates_respects_max() {
        let fabric = ProgressFabric::new();
        fabric.start("s1", 10).await;
        for step in 1..=10 {
            fabric.update("s1", step, "x", None).await;
        }
        let drained = fabric.drain_updates("s1", 3).await;
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].step, 1);
    }

    #[tokio::test]
    async fn cleanup_evicts_only_stale_completed_sessions() {
        let fabric = ProgressFabric::new();
        fabric.start("s1", 1).await;
        fabric.update("s1", 1, "x", None).await;
        fabric.complete("s1").await;

        let removed = fabric.cleanup(Duration::from_secs(0)).await;
        assert_eq!(removed, 1);
        assert!(fabric.get_status("s1").await.is_none());
    }

    #[tokio::test]
    async fn list_active_excludes_completed_sessions() {
        let fabric = ProgressFabric::new();
        fabric.start("s1", 1).await;
        fabric.start("s2", 1).await;
        fabric.complete("s2").await;

        let active = fabric.list_active().await;
        assert_eq!(active, vec!["s1".to_string()]);
    }
}

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::translate::Turn;

/// Per-task edit state. Lives in memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub model_loaded: bool,
    pub source_path: Option<PathBuf>,
    pub transcript: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            model_loaded: false,
            source_path: None,
            transcript: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Concurrent session table keyed by task id.
#[derive(Debug, Default)]
pub struct SessionStore {
    records: DashMap<String, SessionRecord>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record for `task_id`, creating an unloaded one if absent.
    pub fn get_or_create(&self, task_id: &str) -> SessionRecord {
        self.records
            .entry(task_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(task_id, "session created");
                SessionRecord::new()
            })
            .value()
            .clone()
    }

    pub fn get(&self, task_id: &str) -> Option<SessionRecord> {
        self.records.get(task_id).map(|r| r.value().clone())
    }

    pub fn is_model_loaded(&self, task_id: &str) -> bool {
        self.records
            .get(task_id)
            .map(|r| r.model_loaded)
            .unwrap_or(false)
    }

    /// Record a successful load. Creates the session if needed.
    pub fn mark_loaded(&self, task_id: &str, source_path: &Path) {
        let mut record = self
            .records
            .entry(task_id.to_string())
            .or_insert_with(SessionRecord::new);
        record.model_loaded = true;
        record.source_path = Some(source_path.to_path_buf());
        record.touch();
    }

    /// The tool's scene no longer holds this task's model.
    pub fn mark_unloaded(&self, task_id: &str) {
        if let Some(mut record) = self.records.get_mut(task_id) {
            record.model_loaded = false;
            record.touch();
        }
    }

    pub fn transcript(&self, task_id: &str) -> Vec<Turn> {
        self.records
            .get(task_id)
            .map(|r| r.transcript.clone())
            .unwrap_or_default()
    }

    /// Replace the transcript of an existing session. A session reset while
    /// the caller was translating stays reset.
    pub fn store_transcript(&self, task_id: &str, transcript: Vec<Turn>) {
        if let Some(mut record) = self.records.get_mut(task_id) {
            record.transcript = transcript;
            record.touch();
        }
    }

    /// Drop all state for `task_id`. Returns whether a session existed.
    pub fn reset(&self, task_id: &str) -> bool {
        let existed = self.records.remove(task_id).is_some();
        tracing::info!(task_id, existed, "session reset");
        existed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

//! File-backed store: one JSON snapshot file per entity and per instance
//! status, plus an append-only JSON-lines history log per instance.

use super::{EntityRecord, Store};
use crate::core::{CoordError, EntityKey, InstanceId, Result};
use crate::orchestration::{HistoryEvent, InstanceStatus};
use async_trait::async_trait;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub struct FileStore {
    entities_dir: PathBuf,
    history_dir: PathBuf,
    status_dir: PathBuf,
    // One append at a time per store; history files stay crash-readable
    // line by line.
    append_guard: Mutex<()>,
}

impl FileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let entities_dir = root.join("entities");
        let history_dir = root.join("history");
        let status_dir = root.join("status");
        fs::create_dir_all(&entities_dir)?;
        fs::create_dir_all(&history_dir)?;
        fs::create_dir_all(&status_dir)?;
        Ok(Self {
            entities_dir,
            history_dir,
            status_dir,
            append_guard: Mutex::new(()),
        })
    }

    fn entity_path(&self, key: &EntityKey) -> PathBuf {
        self.entities_dir
            .join(format!("{}.json", sanitize(&key.to_string())))
    }

    fn history_path(&self, instance: &InstanceId) -> PathBuf {
        self.history_dir
            .join(format!("{}.jsonl", sanitize(instance.as_str())))
    }

    fn status_path(&self, instance: &InstanceId) -> PathBuf {
        self.status_dir
            .join(format!("{}.json", sanitize(instance.as_str())))
    }

    /// Write-then-rename so a crash never leaves a torn snapshot behind.
    fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_data()?;
        tmp.persist(path)
            .map_err(|e| CoordError::Storage(e.to_string()))?;
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl Store for FileStore {
    async fn save_entity(&self, key: &EntityKey, record: &EntityRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        Self::write_atomic(&self.entities_dir, &self.entity_path(key), &bytes)
    }

    async fn load_entity(&self, key: &EntityKey) -> Result<Option<EntityRecord>> {
        Self::read_json(&self.entity_path(key))
    }

    async fn append_event(&self, instance: &InstanceId, event: &HistoryEvent) -> Result<()> {
        let _guard = self.append_guard.lock().await;
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path(instance))?;
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }

    async fn load_history(&self, instance: &InstanceId) -> Result<Vec<HistoryEvent>> {
        let path = self.history_path(instance);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }

    async fn save_status(&self, instance: &InstanceId, status: &InstanceStatus) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(status)?;
        Self::write_atomic(&self.status_dir, &self.status_path(instance), &bytes)
    }

    async fn load_status(&self, instance: &InstanceId) -> Result<Option<InstanceStatus>> {
        Self::read_json(&self.status_path(instance))
    }
}

use std::fs::{File, OpenOptions};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::RwLock;
use tracing::warn;

use crate::engine::error::EngineError;
use crate::engine::types::*;
use crate::storage::{Mutator, RunStore, apply};

/// File-based JSON run store. Each run is stored as a separate JSON file,
/// so a suspended run can be resumed by a later process.
///
/// Updates hold an exclusive advisory lock on `<run_id>.lock` from read to
/// write, so stores in different processes sharing one directory never
/// interleave a read-modify-write of the same run.
pub struct JsonRunStore {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl JsonRunStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    /// Path of a run file. Ids that could escape `base_dir` have none.
    fn run_path(&self, run_id: &str) -> Option<PathBuf> {
        let valid = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.base_dir.join(format!("{}.json", run_id)))
    }

    fn lock_path(&self, run_id: &str) -> Option<PathBuf> {
        self.run_path(run_id).map(|p| p.with_extension("lock"))
    }

    /// Block (off the async runtime) until this process owns the run's lock
    /// file. The lock is released when the returned handle is dropped.
    async fn lock_run_file(&self, run_id: &str) -> Result<File, EngineError> {
        let path = self
            .lock_path(run_id)
            .ok_or_else(|| EngineError::NotFound(run_id.to_string()))?;

        let file = tokio::task::spawn_blocking(move || -> anyhow::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .with_context(|| format!("Failed to open lock file {}", path.display()))?;
            file.lock_exclusive()
                .with_context(|| format!("Failed to lock {}", path.display()))?;
            Ok(file)
        })
        .await
        .context("Lock task failed")??;

        Ok(file)
    }

    async fn run_exists(&self, run_id: &str) -> Result<bool, EngineError> {
        let Some(path) = self.run_path(run_id) else {
            return Ok(false);
        };
        let exists = tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        Ok(exists)
    }

    async fn read_run(&self, run_id: &str) -> Result<RunRecord, EngineError> {
        let path = self
            .run_path(run_id)
            .ok_or_else(|| EngineError::NotFound(run_id.to_string()))?;
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(EngineError::NotFound(run_id.to_string()));
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read run file: {}", path.display()))
                    .into());
            }
        };
        let record: RunRecord = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse run: {}", run_id))?;
        Ok(record)
    }

    async fn write_run(&self, record: &RunRecord) -> Result<(), EngineError> {
        let path = self
            .run_path(&record.run_id)
            .ok_or_else(|| EngineError::NotFound(record.run_id.clone()))?;
        let tmp_path = path.with_extension("json.tmp");

        let data = serde_json::to_string_pretty(record).context("Failed to serialize run")?;
        tokio::fs::write(&tmp_path, &data)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        Ok(())
    }
}

#[async_trait]
impl RunStore for JsonRunStore {
    async fn create(&self, workflow_id: &str, input: &Payload) -> Result<RunRecord, EngineError> {
        let _lock = self.lock.write().await;

        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.base_dir.display()))?;

        let record = RunRecord::new(workflow_id, input.clone());
        self.write_run(&record).await?;
        Ok(record)
    }

    async fn get(&self, run_id: &str) -> Result<RunRecord, EngineError> {
        let _lock = self.lock.read().await;
        self.read_run(run_id).await
    }

    async fn update(&self, run_id: &str, mutator: Mutator) -> Result<RunRecord, EngineError> {
        let _lock = self.lock.write().await;
        if !self.run_exists(run_id).await? {
            return Err(EngineError::NotFound(run_id.to_string()));
        }

        let _file_lock = self.lock_run_file(run_id).await?;
        let current = self.read_run(run_id).await?;
        let next = apply(&current, mutator)?;
        self.write_run(&next).await?;
        Ok(next)
    }

    async fn list(&self, status: Option<RunStatus>) -> Result<Vec<RunRecord>, EngineError> {
        let _lock = self.lock.read().await;

        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_dir)
            .await
            .with_context(|| format!("Failed to list {}", self.base_dir.display()))?;

        while let Some(entry) = entries.next_entry().await.context("Failed to list runs")? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(data) => serde_json::from_str::<RunRecord>(&data).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(record) if status.is_none_or(|s| record.status() == s) => runs.push(record),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable run file"),
            }
        }

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(runs)
    }

    async fn delete(&self, run_id: &str) -> Result<(), EngineError> {
        let _lock = self.lock.write().await;
        let path = self
            .run_path(run_id)
            .ok_or_else(|| EngineError::NotFound(run_id.to_string()))?;
        if !self.run_exists(run_id).await? {
            return Err(EngineError::NotFound(run_id.to_string()));
        }

        let file_lock = self.lock_run_file(run_id).await?;
        let removed = tokio::fs::remove_file(&path).await;
        drop(file_lock);
        if let Some(lock_path) = self.lock_path(run_id)
            && let Err(e) = tokio::fs::remove_file(&lock_path).await
            && e.kind() != IoErrorKind::NotFound
        {
            warn!(path = %lock_path.display(), error = %e, "Failed to remove run lock file");
        }

        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                Err(EngineError::NotFound(run_id.to_string()))
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to delete {}", path.display()))
                .into()),
        }
    }
}

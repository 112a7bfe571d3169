//! Task documents, kept in memory and mirrored to a JSON file.
//!
//! Writes are serialized by the store's lock, so each update sees the result
//! of the one before it. There is no versioning: the last write wins.

use crate::models::{Invalid, NewTask, Task};
use crate::views::TaskQuery;
use chrono::Utc;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Invalid(#[from] Invalid),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Document file is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub struct TaskStore {
    path: Option<PathBuf>,
    docs: RwLock<HashMap<String, Task>>,
}

impl TaskStore {
    /// A store that never touches disk.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        TaskStore {
            path: None,
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Loads the document file at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let docs = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let tasks: Vec<Task> = serde_json::from_slice(&bytes)?;
                tasks
                    .into_iter()
                    .map(|mut t| {
                        t.reconcile();
                        (t.id.clone(), t)
                    })
                    .collect()
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        info!(path = %path.display(), tasks = docs.len(), "opened task store");
        Ok(TaskStore {
            path: Some(path),
            docs: RwLock::new(docs),
        })
    }

    /// Matching tasks, newest first.
    pub async fn list(&self, query: &TaskQuery) -> Vec<Task> {
        let docs = self.docs.read().await;
        let mut tasks: Vec<Task> = docs.values().filter(|t| query.matches(t)).cloned().collect();
        sort_newest_first(&mut tasks);
        tasks
    }

    pub async fn get(&self, id: &str) -> Result<Task, StoreError> {
        self.docs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub async fn create(&self, new: NewTask) -> Result<Task, StoreError> {
        let task = Task::create(Uuid::new_v4().to_string(), new, Utc::now())?;
        let mut docs = self.docs.write().await;
        docs.insert(task.id.clone(), task.clone());
        if let Err(err) = self.persist(&docs).await {
            docs.remove(&task.id);
            return Err(err);
        }
        debug!(id = %task.id, "created task");
        Ok(task)
    }

    /// Runs `change` on a copy of the task and stores the result if it succeeds.
    ///
    /// The lookup, the change and the write happen under one lock, so checks
    /// made inside `change` still hold when the write lands. When `change`
    /// fails the stored record is untouched.
    pub async fn modify<E, F>(&self, id: &str, change: F) -> Result<Task, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut Task) -> Result<(), E>,
    {
        let mut docs = self.docs.write().await;
        let current = docs
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut updated = current.clone();
        change(&mut updated)?;

        let previous = docs.insert(id.to_string(), updated.clone());
        if let Err(err) = self.persist(&docs).await {
            if let Some(previous) = previous {
                docs.insert(id.to_string(), previous);
            }
            return Err(err.into());
        }
        debug!(id, status = %updated.status, progress = updated.progress, "updated task");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<Task, StoreError> {
        let mut docs = self.docs.write().await;
        let removed = docs
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Err(err) = self.persist(&docs).await {
            docs.insert(id.to_string(), removed);
            return Err(err);
        }
        debug!(id, "deleted task");
        Ok(removed)
    }

    /// Drops every document and stores `tasks` instead.
    pub async fn replace_all(&self, tasks: Vec<Task>) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        let fresh: HashMap<String, Task> = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        self.persist(&fresh).await?;
        *docs = fresh;
        Ok(())
    }

    async fn persist(&self, docs: &HashMap<String, Task>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut tasks: Vec<Task> = docs.values().cloned().collect();
        sort_newest_first(&mut tasks);
        let bytes = serde_json::to_vec_pretty(&tasks)?;
        write_atomically(path, &bytes).await?;
        Ok(())
    }
}

fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

//! Client-side task cache.
//!
//! Every page of the terminal client reads tasks from here. List responses
//! replace the contents, mutation responses patch single entries. List fetches
//! are numbered, and only the answer to the most recent one is applied.

use crate::models::Task;
use std::collections::HashMap;
use tracing::debug;

/// Identifies one list fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

#[derive(Debug, Default)]
pub struct TaskCache {
    tasks: HashMap<String, Task>,
    // server order of the last applied list, then local inserts
    order: Vec<String>,
    issued: u64,
    offline: bool,
    loaded: bool,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a list fetch; any fetch begun earlier becomes stale.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.issued += 1;
        FetchTicket(self.issued)
    }

    /// Applies a list response. Returns false, leaving the cache untouched, when
    /// a newer fetch has been started since `ticket` was issued.
    pub fn apply_fetch(&mut self, ticket: FetchTicket, tasks: Vec<Task>, offline: bool) -> bool {
        if ticket.0 != self.issued {
            debug!(ticket = ticket.0, latest = self.issued, "dropping stale task list");
            return false;
        }
        self.order = tasks.iter().map(|t| t.id.clone()).collect();
        self.tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        self.offline = offline;
        self.loaded = true;
        true
    }

    /// Stores the server's copy of a single task, e.g. after an update.
    pub fn upsert(&mut self, task: Task) {
        if !self.tasks.contains_key(&task.id) {
            // new tasks are the newest, so they go first
            self.order.insert(0, task.id.clone());
        }
        self.tasks.insert(task.id.clone(), task);
    }

    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let removed = self.tasks.remove(id)?;
        self.order.retain(|known| known != id);
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Cached tasks in display order.
    pub fn snapshot(&self) -> Vec<Task> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .cloned()
            .collect()
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

//! Process Registry, per §4.9: process-wide map from `process_id` to live execution
//! handles, with per-owner quotas and grace-period reaping of terminal Processes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::error::FacadeError;
use crate::models::{Process, ProcessStatus};

struct Entry {
    process: Arc<Process>,
    terminal_since: Option<Instant>,
}

/// Coarse-locked membership map; reads hand back a cloned `Arc<Process>` so callers never
/// hold the registry lock while working with a Process (§5's shared-resource policy).
pub struct ProcessRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    owner_quota: usize,
    grace_period: Duration,
}

impl ProcessRegistry {
    pub fn new(owner_quota: usize, grace_period: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            owner_quota,
            grace_period,
        }
    }

    /// Register a new Process, rejecting if the owner is already at quota.
    pub async fn create(&self, process: Arc<Process>) -> Result<(), FacadeError> {
        let mut entries = self.entries.write().await;
        let active_for_owner = entries
            .values()
            .filter(|e| e.process.owned_by(&process.owner) && !e.process.status().is_terminal())
            .count();
        if active_for_owner >= self.owner_quota {
            return Err(FacadeError::TooManyProcesses);
        }
        entries.insert(
            process.id.clone(),
            Entry {
                process,
                terminal_since: None,
            },
        );
        Ok(())
    }

    /// Fetch a Process, verifying `owner` matches.
    pub async fn get(&self, process_id: &str, owner: &str) -> Result<Arc<Process>, FacadeError> {
        let entries = self.entries.read().await;
        let entry = entries.get(process_id).ok_or(FacadeError::NotFound)?;
        if !entry.process.owned_by(owner) {
            return Err(FacadeError::Forbidden);
        }
        Ok(entry.process.clone())
    }

    pub async fn evict(&self, process_id: &str) {
        self.entries.write().await.remove(process_id);
    }

    /// Mark entries whose Process just reached a terminal status so the reaper can later
    /// evict them after the grace period.
    pub async fn mark_terminal_transitions(&self) {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            if entry.process.status().is_terminal() && entry.terminal_since.is_none() {
                entry.terminal_since = Some(Instant::now());
            }
        }
    }

    /// Evict every Process that has been terminal for longer than the grace period.
    pub async fn reap_expired(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| match entry.terminal_since {
            Some(since) => since.elapsed() < self.grace_period,
            None => true,
        });
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Spawn a background task that periodically marks terminal transitions and reaps expired
/// Processes. Returns the task's handle so callers can abort it on shutdown.
pub fn spawn_reaper(registry: Arc<ProcessRegistry>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            registry.mark_terminal_transitions().await;
            registry.reap_expired().await;
        }
    })
}

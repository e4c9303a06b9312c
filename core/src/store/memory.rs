use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{PlanRunState, RunStore};
use crate::error::StoreError;

struct Entry {
    state: PlanRunState,
    leased: bool,
    touched: Instant,
}

/// Process-local run store. Runs do not survive a restart.
pub struct MemoryRunStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Option<Duration>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: None,
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn expired(&self, entry: &Entry) -> bool {
        self.ttl.is_some_and(|ttl| entry.touched.elapsed() >= ttl)
    }
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn save(&self, state: &PlanRunState) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            state.run_id.clone(),
            Entry {
                state: state.clone(),
                leased: false,
                touched: Instant::now(),
            },
        );
        Ok(())
    }

    async fn claim(&self, run_id: &str, tool: &str) -> Result<PlanRunState, StoreError> {
        let mut entries = self.entries.lock().await;

        let expired = match entries.get(run_id) {
            None => return Err(StoreError::Unknown(run_id.to_string())),
            Some(entry) => self.expired(entry),
        };
        if expired {
            entries.remove(run_id);
            return Err(StoreError::Unknown(run_id.to_string()));
        }

        let entry = entries
            .get_mut(run_id)
            .ok_or_else(|| StoreError::Unknown(run_id.to_string()))?;
        if entry.state.tool != tool {
            return Err(StoreError::Unknown(run_id.to_string()));
        }
        if entry.leased {
            return Err(StoreError::Busy(run_id.to_string()));
        }

        entry.leased = true;
        entry.touched = Instant::now();
        Ok(entry.state.clone())
    }

    async fn release(&self, run_id: &str) -> Result<(), StoreError> {
        if let Some(entry) = self.entries.lock().await.get_mut(run_id) {
            entry.leased = false;
        }
        Ok(())
    }

    async fn discard(&self, run_id: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(run_id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !self.expired(entry));
        Ok(before - entries.len())
    }
}

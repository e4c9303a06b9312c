//! Where suspended plan runs wait to be resumed.
//!
//! The executor never keeps a paused run in memory of its own: everything it
//! needs to continue goes through a [`RunStore`]. A resume first *claims* the
//! run, which leases it exclusively, so two callers can never drive the same
//! run forward at once.

mod memory;
mod sqlite;

pub use memory::MemoryRunStore;
pub use sqlite::SqliteRunStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::tool::ExecutionContext;

/// A paused plan, as persisted between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRunState {
    pub run_id: String,
    pub tool: String,
    /// First step to execute on resume.
    pub step_index: usize,
    pub context: ExecutionContext,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts or replaces the run and clears any lease on it.
    async fn save(&self, state: &PlanRunState) -> Result<(), StoreError>;

    /// Leases the run for one resume.
    ///
    /// Fails with `Unknown` when the id is missing, expired, or belongs to
    /// another tool, and with `Busy` when someone else holds the lease.
    async fn claim(&self, run_id: &str, tool: &str) -> Result<PlanRunState, StoreError>;

    /// Drops the lease without touching the stored state.
    async fn release(&self, run_id: &str) -> Result<(), StoreError>;

    async fn discard(&self, run_id: &str) -> Result<(), StoreError>;

    /// Removes runs untouched for longer than the store's TTL; returns how many went.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

//! Entity store seam
//!
//! Persistence trait for progression state and the activity log. The engine
//! operates exclusively through this trait; backends are pluggable
//! (`MemoryStore` here, a database in production).

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::activity::ActivityLogEntry;
use crate::state::ProgressionState;

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Persist the state and append its activity entries as a single atomic
    /// unit: either everything lands or nothing does. Entries keep their
    /// per-entity append order.
    async fn commit(
        &self,
        state: &ProgressionState,
        entries: &[ActivityLogEntry],
    ) -> Result<()>;

    async fn load_state(&self, entity_id: Uuid) -> Result<Option<ProgressionState>>;

    /// Read activity entries from `from_seq` (1-based) in append order.
    async fn read_activity(
        &self,
        entity_id: Uuid,
        from_seq: u64,
    ) -> Result<Vec<(u64, ActivityLogEntry)>>;
}

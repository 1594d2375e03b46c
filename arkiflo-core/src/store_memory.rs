//! In-memory `EntityStore` backend.
//!
//! One lock guards both maps so a commit lands state and activity entries
//! together. Sequence numbers start at 1, matching what a database sequence
//! would hand out.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::activity::ActivityLogEntry;
use crate::state::ProgressionState;
use crate::store::EntityStore;

#[derive(Default)]
struct Inner {
    states: HashMap<Uuid, ProgressionState>,
    activity: HashMap<Uuid, Vec<ActivityLogEntry>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn commit(
        &self,
        state: &ProgressionState,
        entries: &[ActivityLogEntry],
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.states.insert(state.entity_id, state.clone());
        inner
            .activity
            .entry(state.entity_id)
            .or_default()
            .extend_from_slice(entries);
        Ok(())
    }

    async fn load_state(&self, entity_id: Uuid) -> Result<Option<ProgressionState>> {
        Ok(self.inner.read().await.states.get(&entity_id).cloned())
    }

    async fn read_activity(
        &self,
        entity_id: Uuid,
        from_seq: u64,
    ) -> Result<Vec<(u64, ActivityLogEntry)>> {
        let inner = self.inner.read().await;
        let log = inner
            .activity
            .get(&entity_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Ok(log
            .iter()
            .enumerate()
            .map(|(i, e)| (i as u64 + 1, e.clone()))
            .filter(|(seq, _)| *seq >= from_seq)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityEvent;
    use crate::actor::{Actor, Capability};
    use crate::catalog::EntityKind;
    use crate::state::HoldStatus;

    fn hold_entry(entity_id: Uuid, actor: &Actor, old: HoldStatus, new: HoldStatus) -> ActivityLogEntry {
        ActivityLogEntry::emit(
            entity_id,
            actor,
            format!("{old} -> {new}"),
            ActivityEvent::HoldStatusChanged {
                old,
                new,
                reason: "test".into(),
            },
        )
    }

    #[tokio::test]
    async fn state_round_trip() {
        let store = MemoryStore::new();
        let state = ProgressionState::new(
            Uuid::new_v4(),
            EntityKind::Lead,
            None,
            "lead_funnel".to_string(),
        );
        store.commit(&state, &[]).await.unwrap();
        let loaded = store.load_state(state.entity_id).await.unwrap().unwrap();
        assert_eq!(loaded.current_stage, "lead_funnel");
        assert!(store.load_state(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_lands_state_and_entries_together() {
        let store = MemoryStore::new();
        let mut state = ProgressionState::new(
            Uuid::new_v4(),
            EntityKind::Lead,
            None,
            "lead_funnel".to_string(),
        );
        let actor = Actor::new(Uuid::new_v4(), "Priya", Capability::Base);

        let first = hold_entry(state.entity_id, &actor, HoldStatus::Active, HoldStatus::Hold);
        state.hold_status = HoldStatus::Hold;
        store.commit(&state, &[first]).await.unwrap();

        let second = hold_entry(state.entity_id, &actor, HoldStatus::Hold, HoldStatus::Active);
        state.hold_status = HoldStatus::Active;
        store.commit(&state, &[second]).await.unwrap();

        let loaded = store.load_state(state.entity_id).await.unwrap().unwrap();
        assert_eq!(loaded.hold_status, HoldStatus::Active);

        let entries = store.read_activity(state.entity_id, 1).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, 1);
        assert_eq!(entries[1].0, 2);
        assert!(entries[0].1.message.contains("active -> hold"));

        let tail = store.read_activity(state.entity_id, 2).await.unwrap();
        assert_eq!(tail.len(), 1);
    }
}

//! Activity log
//!
//! Append-only, immutable audit entries — one per progression mutation.
//! The emitter is pure: it stamps id, timestamp, and actor; persistence is
//! the store's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actor::Actor;
use crate::state::HoldStatus;

/// Structured payload for an activity entry. One variant per mutation kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActivityEvent {
    SubStageCompleted {
        sub_stage_id: String,
        sub_stage_name: String,
        group_name: String,
    },
    PercentageUpdated {
        sub_stage_id: String,
        sub_stage_name: String,
        old: u8,
        new: u8,
        comment: Option<String>,
    },
    AutoCompleted {
        target: AutoCompleteTarget,
    },
    StageChanged {
        from_stage: String,
        to_stage: String,
        rollback: bool,
    },
    HoldStatusChanged {
        old: HoldStatus,
        new: HoldStatus,
        reason: String,
    },
}

/// What an auto-completion applied to: a group finishing, or a percentage
/// sub-stage reaching 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AutoCompleteTarget {
    Group {
        group_id: String,
        group_name: String,
    },
    SubStage {
        sub_stage_id: String,
        sub_stage_name: String,
    },
}

impl ActivityEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubStageCompleted { .. } => "SubStageCompleted",
            Self::PercentageUpdated { .. } => "PercentageUpdated",
            Self::AutoCompleted { .. } => "AutoCompleted",
            Self::StageChanged { .. } => "StageChanged",
            Self::HoldStatusChanged { .. } => "HoldStatusChanged",
        }
    }
}

/// One immutable audit entry. Never edited or removed once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    /// Time-ordered v7 id.
    pub id: Uuid,
    pub entity_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor_user_id: Uuid,
    pub actor_name: String,
    /// Human-readable summary including the entity's PID when present.
    pub message: String,
    pub event: ActivityEvent,
}

impl ActivityLogEntry {
    pub fn emit(entity_id: Uuid, actor: &Actor, message: String, event: ActivityEvent) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_id,
            timestamp: Utc::now(),
            actor_user_id: actor.user_id,
            actor_name: actor.name.clone(),
            message,
            event,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }
}

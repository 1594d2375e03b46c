//! Arkiflo progression core
//!
//! Forward-only milestone progression for Leads and Projects: an ordered
//! stage/sub-stage catalog, per-entity progression state, an engine that
//! validates and applies mutations, hold/lifecycle gating, and an
//! append-only activity log. Everything around it (HTTP, persistence
//! technology, notifications) is an external collaborator behind the
//! `EntityStore` seam.

pub mod activity;
pub mod actor;
pub mod catalog;
pub mod engine;
pub mod hold;
pub mod state;
pub mod store;
pub mod store_memory;

pub use activity::{ActivityEvent, ActivityLogEntry, AutoCompleteTarget};
pub use actor::{Actor, Capability};
pub use catalog::{CatalogError, EntityKind, MilestoneGroup, StageCatalog, SubStageDef, SubStageKind};
pub use engine::{ProgressionEngine, TransitionResult};
pub use hold::HoldAction;
pub use state::{GroupProgress, HoldStatus, ProgressionSnapshot, ProgressionState};
pub use store::EntityStore;
pub use store_memory::MemoryStore;

use thiserror::Error;
use uuid::Uuid;

/// Validation failures returned synchronously to the caller. None are
/// retried internally and none leave partial state behind.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no progression state for entity {0}")]
    UnknownEntity(Uuid),

    #[error("progression already exists for entity {0}")]
    AlreadyExists(Uuid),

    #[error("sub-stage '{0}' is not defined for this entity kind")]
    InvalidSubStage(String),

    #[error("sub-stage '{0}' is already completed")]
    AlreadyCompleted(String),

    #[error("cannot complete '{attempted}': '{expected}' must be completed first")]
    OutOfOrder { attempted: String, expected: String },

    #[error("sub-stage '{0}' does not track percentage")]
    NotPercentageType(String),

    #[error("percentage {0} is outside 0-100")]
    InvalidPercentage(u8),

    #[error("percentage cannot decrease from {old} to {new}")]
    PercentageDecreaseNotAllowed { old: u8, new: u8 },

    #[error("entity is {status}; progression is frozen until reactivated")]
    EntityOnHold { status: HoldStatus },

    #[error("moving back from '{from}' to '{to}' requires elevated access")]
    ForwardOnlyViolation { from: String, to: String },

    #[error("unknown stage '{0}'")]
    InvalidStage(String),

    #[error("a reason is required for hold status changes")]
    ReasonRequired,

    #[error("{capability} capability may not {action} an entity")]
    Forbidden {
        capability: Capability,
        action: HoldAction,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

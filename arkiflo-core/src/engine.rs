//! Progression Engine
//!
//! Sole authority for mutating progression state. Validates forward-only
//! order against the catalog, applies auto-completion, enforces hold
//! gating, and appends activity entries — all under a per-entity lock so
//! concurrent callers against the same entity serialize while different
//! entities proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::activity::{ActivityEvent, ActivityLogEntry, AutoCompleteTarget};
use crate::actor::Actor;
use crate::catalog::{EntityKind, StageCatalog, SubStageDef, SubStageKind};
use crate::hold::{self, HoldAction};
use crate::state::{ProgressionSnapshot, ProgressionState};
use crate::store::EntityStore;
use crate::EngineError;

/// Outcome of a mutating operation: the new snapshot, the activity entries
/// produced, and explicit flags for the caller.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransitionResult {
    pub snapshot: ProgressionSnapshot,
    pub entries: Vec<ActivityLogEntry>,
    pub group_complete: bool,
    pub entity_complete: bool,
    pub auto_completed: bool,
    pub percentage: Option<u8>,
}

pub struct ProgressionEngine {
    store: Arc<dyn EntityStore>,
    lead_catalog: StageCatalog,
    project_catalog: StageCatalog,
    /// Per-entity mutation locks, created lazily. Weak references so idle
    /// entries can be pruned instead of accumulating forever.
    locks: Mutex<HashMap<Uuid, Weak<Mutex<()>>>>,
}

impl ProgressionEngine {
    /// Engine over the built-in Lead and Project catalogs.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self::with_catalogs(store, StageCatalog::lead(), StageCatalog::project())
    }

    /// Engine over externally loaded catalogs (e.g. from YAML configuration).
    pub fn with_catalogs(
        store: Arc<dyn EntityStore>,
        lead_catalog: StageCatalog,
        project_catalog: StageCatalog,
    ) -> Self {
        Self {
            store,
            lead_catalog,
            project_catalog,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self, kind: EntityKind) -> &StageCatalog {
        match kind {
            EntityKind::Lead => &self.lead_catalog,
            EntityKind::Project => &self.project_catalog,
        }
    }

    /// Create fresh progression state for a newly created entity.
    pub async fn create(
        &self,
        entity_id: Uuid,
        entity_kind: EntityKind,
        pid: Option<String>,
    ) -> Result<ProgressionSnapshot, EngineError> {
        let lock = self.entity_lock(entity_id).await;
        let _guard = lock.lock().await;

        if self.store.load_state(entity_id).await?.is_some() {
            return Err(EngineError::AlreadyExists(entity_id));
        }

        let catalog = self.catalog(entity_kind);
        let state = ProgressionState::new(
            entity_id,
            entity_kind,
            pid,
            catalog.first_group().id.clone(),
        );
        self.store.commit(&state, &[]).await?;

        debug!(%entity_id, kind = %entity_kind, "progression created");
        Ok(ProgressionSnapshot::of(&state, catalog))
    }

    /// Complete the next discrete (or percentage) sub-stage in catalog order.
    pub async fn complete_sub_stage(
        &self,
        entity_id: Uuid,
        sub_stage_id: &str,
        actor: &Actor,
    ) -> Result<TransitionResult, EngineError> {
        let lock = self.entity_lock(entity_id).await;
        let _guard = lock.lock().await;

        let mut state = self.load(entity_id).await?;
        ensure_active(&state)?;

        let catalog = self.catalog(state.entity_kind);
        let def = catalog
            .sub_stage(sub_stage_id)
            .ok_or_else(|| EngineError::InvalidSubStage(sub_stage_id.to_string()))?;
        check_is_next(catalog, &state, def)?;

        let mut entries = Vec::new();
        let (group_complete, entity_complete) =
            apply_completion(catalog, &mut state, def, actor, false, &mut entries)?;

        self.commit(&state, &entries).await?;
        info!(
            %entity_id,
            sub_stage = %def.id,
            group_complete,
            entity_complete,
            "sub-stage completed"
        );

        Ok(TransitionResult {
            snapshot: ProgressionSnapshot::of(&state, catalog),
            entries,
            group_complete,
            entity_complete,
            auto_completed: false,
            percentage: None,
        })
    }

    /// Update the stored value of a percentage-kind sub-stage. Reaching 100
    /// completes the sub-stage; no separate completion call exists.
    pub async fn set_sub_stage_percentage(
        &self,
        entity_id: Uuid,
        sub_stage_id: &str,
        percentage: u8,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<TransitionResult, EngineError> {
        if percentage > 100 {
            return Err(EngineError::InvalidPercentage(percentage));
        }

        let lock = self.entity_lock(entity_id).await;
        let _guard = lock.lock().await;

        let mut state = self.load(entity_id).await?;
        ensure_active(&state)?;

        let catalog = self.catalog(state.entity_kind);
        let def = catalog
            .sub_stage(sub_stage_id)
            .ok_or_else(|| EngineError::InvalidSubStage(sub_stage_id.to_string()))?;
        if def.kind != SubStageKind::Percentage {
            return Err(EngineError::NotPercentageType(def.id.clone()));
        }
        check_is_next(catalog, &state, def)?;

        let old = state.percentage_of(&def.id);
        if percentage < old && !actor.capability.is_elevated() {
            return Err(EngineError::PercentageDecreaseNotAllowed {
                old,
                new: percentage,
            });
        }

        state.sub_stage_percentage.insert(def.id.clone(), percentage);
        state.touch();

        let label = state.display_label();
        let mut message = format!(
            "{label}: '{}' progress {old}% -> {percentage}%",
            def.name
        );
        if let Some(c) = &comment {
            message.push_str(&format!(" ({c})"));
        }
        let mut entries = vec![ActivityLogEntry::emit(
            entity_id,
            actor,
            message,
            ActivityEvent::PercentageUpdated {
                sub_stage_id: def.id.clone(),
                sub_stage_name: def.name.clone(),
                old,
                new: percentage,
                comment,
            },
        )];

        let mut group_complete = false;
        let mut entity_complete = false;
        let auto_completed = percentage == 100;
        if auto_completed {
            let (gc, ec) = apply_completion(catalog, &mut state, def, actor, true, &mut entries)?;
            group_complete = gc;
            entity_complete = ec;
        }

        self.commit(&state, &entries).await?;
        info!(
            %entity_id,
            sub_stage = %def.id,
            old,
            new = percentage,
            auto_completed,
            "percentage updated"
        );

        Ok(TransitionResult {
            snapshot: ProgressionSnapshot::of(&state, catalog),
            entries,
            group_complete,
            entity_complete,
            auto_completed,
            percentage: Some(percentage),
        })
    }

    /// Administrative stage override. Ordinary progression derives the stage
    /// from sub-stage completion; this exists for forced assignment and the
    /// elevated-only rollback escape hatch. Rollback changes only the
    /// displayed stage — sub-stage history is preserved for audit.
    pub async fn change_stage(
        &self,
        entity_id: Uuid,
        target_stage: &str,
        actor: &Actor,
    ) -> Result<TransitionResult, EngineError> {
        let lock = self.entity_lock(entity_id).await;
        let _guard = lock.lock().await;

        let mut state = self.load(entity_id).await?;
        let catalog = self.catalog(state.entity_kind);
        let target = catalog
            .group(target_stage)
            .ok_or_else(|| EngineError::InvalidStage(target_stage.to_string()))?;
        let current = catalog
            .group(&state.current_stage)
            .ok_or_else(|| EngineError::InvalidStage(state.current_stage.clone()))?;

        let rollback = target.order < current.order;
        if rollback && !actor.capability.is_elevated() {
            return Err(EngineError::ForwardOnlyViolation {
                from: current.name.clone(),
                to: target.name.clone(),
            });
        }

        let from_stage = state.current_stage.clone();
        state.current_stage = target.id.clone();
        if rollback {
            state.entity_complete = false;
        }
        state.touch();

        let label = state.display_label();
        let entries = vec![ActivityLogEntry::emit(
            entity_id,
            actor,
            format!(
                "{label}: stage changed from '{}' to '{}'{}",
                current.name,
                target.name,
                if rollback { " (rollback)" } else { "" }
            ),
            ActivityEvent::StageChanged {
                from_stage,
                to_stage: target.id.clone(),
                rollback,
            },
        )];

        self.commit(&state, &entries).await?;
        info!(%entity_id, stage = %target.id, rollback, "stage changed");

        Ok(TransitionResult {
            snapshot: ProgressionSnapshot::of(&state, catalog),
            entries,
            group_complete: false,
            entity_complete: state.entity_complete,
            auto_completed: false,
            percentage: None,
        })
    }

    /// Hold / Activate / Deactivate with a mandatory reason. While the
    /// status is not Active the progression operations reject every call.
    pub async fn set_hold_status(
        &self,
        entity_id: Uuid,
        action: HoldAction,
        reason: &str,
        actor: &Actor,
    ) -> Result<TransitionResult, EngineError> {
        hold::validate_reason(reason)?;

        let lock = self.entity_lock(entity_id).await;
        let _guard = lock.lock().await;

        let mut state = self.load(entity_id).await?;
        hold::authorize(action, actor.capability, state.hold_status)?;

        let old = state.hold_status;
        let new = action.target_status();
        let reason = reason.trim().to_string();
        state.set_hold(new, reason.clone(), actor.name.clone());

        let label = state.display_label();
        let catalog = self.catalog(state.entity_kind);
        let entries = vec![ActivityLogEntry::emit(
            entity_id,
            actor,
            format!("{label}: status changed {old} -> {new}: {reason}"),
            ActivityEvent::HoldStatusChanged { old, new, reason },
        )];

        self.commit(&state, &entries).await?;
        info!(%entity_id, %old, %new, "hold status changed");

        Ok(TransitionResult {
            snapshot: ProgressionSnapshot::of(&state, catalog),
            entries,
            group_complete: false,
            entity_complete: state.entity_complete,
            auto_completed: false,
            percentage: None,
        })
    }

    /// Read-only snapshot with per-group progress. Takes no entity lock.
    pub async fn get_progress(&self, entity_id: Uuid) -> Result<ProgressionSnapshot, EngineError> {
        let state = self.load(entity_id).await?;
        Ok(ProgressionSnapshot::of(&state, self.catalog(state.entity_kind)))
    }

    async fn load(&self, entity_id: Uuid) -> Result<ProgressionState, EngineError> {
        self.store
            .load_state(entity_id)
            .await?
            .ok_or(EngineError::UnknownEntity(entity_id))
    }

    /// One atomic store write: state plus its activity entries. Validation
    /// has already passed; a storage failure leaves no partial change.
    async fn commit(
        &self,
        state: &ProgressionState,
        entries: &[ActivityLogEntry],
    ) -> Result<(), EngineError> {
        self.store.commit(state, entries).await?;
        Ok(())
    }

    async fn entity_lock(&self, entity_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = locks.get(&entity_id).and_then(Weak::upgrade) {
            return existing;
        }
        let lock = Arc::new(Mutex::new(()));
        locks.insert(entity_id, Arc::downgrade(&lock));
        lock
    }
}

fn ensure_active(state: &ProgressionState) -> Result<(), EngineError> {
    if state.hold_status.is_active() {
        Ok(())
    } else {
        Err(EngineError::EntityOnHold {
            status: state.hold_status,
        })
    }
}

/// Forward-only check shared by discrete completion and percentage entry:
/// the sub-stage must be exactly the catalog's next one.
fn check_is_next(
    catalog: &StageCatalog,
    state: &ProgressionState,
    def: &SubStageDef,
) -> Result<(), EngineError> {
    if state.is_completed(&def.id) {
        return Err(EngineError::AlreadyCompleted(def.id.clone()));
    }
    let next = catalog
        .next_sub_stage(&state.completed_sub_stages)
        .ok_or_else(|| EngineError::AlreadyCompleted(def.id.clone()))?;
    if next.id != def.id {
        return Err(EngineError::OutOfOrder {
            attempted: def.name.clone(),
            expected: next.name.clone(),
        });
    }
    Ok(())
}

/// Add a sub-stage to the completed set, emit its entries, and advance the
/// stage when the group finishes. `auto` marks completion driven by a
/// percentage reaching 100.
fn apply_completion(
    catalog: &StageCatalog,
    state: &mut ProgressionState,
    def: &SubStageDef,
    actor: &Actor,
    auto: bool,
    entries: &mut Vec<ActivityLogEntry>,
) -> Result<(bool, bool), EngineError> {
    let group = catalog
        .group_of(&def.id)
        .ok_or_else(|| EngineError::InvalidSubStage(def.id.clone()))?;

    state.completed_sub_stages.push(def.id.clone());
    state.touch();

    let label = state.display_label();
    entries.push(ActivityLogEntry::emit(
        state.entity_id,
        actor,
        format!("{label}: sub-stage '{}' completed", def.name),
        ActivityEvent::SubStageCompleted {
            sub_stage_id: def.id.clone(),
            sub_stage_name: def.name.clone(),
            group_name: group.name.clone(),
        },
    ));

    if auto {
        entries.push(ActivityLogEntry::emit(
            state.entity_id,
            actor,
            format!("{label}: '{}' auto-completed at 100%", def.name),
            ActivityEvent::AutoCompleted {
                target: AutoCompleteTarget::SubStage {
                    sub_stage_id: def.id.clone(),
                    sub_stage_name: def.name.clone(),
                },
            },
        ));
    }

    let group_complete = catalog.is_group_complete(&group.id, &state.completed_sub_stages);
    let mut entity_complete = false;
    if group_complete {
        let message = match catalog.group_after(&group.id) {
            Some(next_group) => {
                state.current_stage = next_group.id.clone();
                format!(
                    "{label}: stage '{}' complete, moved to '{}'",
                    group.name, next_group.name
                )
            }
            None => {
                state.entity_complete = true;
                entity_complete = true;
                format!(
                    "{label}: stage '{}' complete, {} fully completed",
                    group.name, state.entity_kind
                )
            }
        };
        entries.push(ActivityLogEntry::emit(
            state.entity_id,
            actor,
            message,
            ActivityEvent::AutoCompleted {
                target: AutoCompleteTarget::Group {
                    group_id: group.id.clone(),
                    group_name: group.name.clone(),
                },
            },
        ));
    }

    Ok((group_complete, entity_complete))
}

//! Progression State
//!
//! Per-entity mutable record of milestone progress, plus the read-only
//! snapshot shape returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::catalog::{EntityKind, StageCatalog, SubStageKind};

/// Operational status gating all progression mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldStatus {
    Active,
    Hold,
    Deactivated,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Hold => "hold",
            Self::Deactivated => "deactivated",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable progression record, one per Lead or Project.
///
/// Mutated exclusively through the engine; its lifetime equals the owning
/// entity's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionState {
    pub entity_id: Uuid,
    pub entity_kind: EntityKind,
    /// External human-readable identifier, used only in log messages.
    pub pid: Option<String>,

    /// Current coarse stage (a catalog group id).
    pub current_stage: String,
    /// Set once the catalog's final sub-stage completes.
    pub entity_complete: bool,

    /// Completed sub-stage ids. Always a prefix of the catalog order.
    pub completed_sub_stages: Vec<String>,
    /// Stored value for percentage-kind sub-stages, 0–100.
    pub sub_stage_percentage: BTreeMap<String, u8>,

    pub hold_status: HoldStatus,
    /// Overwritten on every hold transition; history lives in the activity log.
    pub hold_reason: Option<String>,
    pub hold_changed_by: Option<String>,
    pub hold_changed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressionState {
    /// Fresh state: empty progress, first group, Active.
    pub fn new(entity_id: Uuid, entity_kind: EntityKind, pid: Option<String>, initial_stage: String) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            entity_kind,
            pid,
            current_stage: initial_stage,
            entity_complete: false,
            completed_sub_stages: Vec::new(),
            sub_stage_percentage: BTreeMap::new(),
            hold_status: HoldStatus::Active,
            hold_reason: None,
            hold_changed_by: None,
            hold_changed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, sub_stage_id: &str) -> bool {
        self.completed_sub_stages.iter().any(|c| c == sub_stage_id)
    }

    pub fn percentage_of(&self, sub_stage_id: &str) -> u8 {
        self.sub_stage_percentage.get(sub_stage_id).copied().unwrap_or(0)
    }

    /// Record a hold transition, overwriting the previous reason fields.
    pub fn set_hold(&mut self, status: HoldStatus, reason: String, by: String) {
        let now = Utc::now();
        self.hold_status = status;
        self.hold_reason = Some(reason);
        self.hold_changed_by = Some(by);
        self.hold_changed_at = Some(now);
        self.updated_at = now;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Label used in activity messages, e.g. "Project ARK-1042".
    pub fn display_label(&self) -> String {
        match &self.pid {
            Some(pid) => format!("{} {}", self.entity_kind, pid),
            None => format!("{} {}", self.entity_kind, self.entity_id),
        }
    }
}

/// Per-group progress rollup for the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupProgress {
    pub group_id: String,
    pub name: String,
    pub total: u32,
    pub completed: u32,
    /// 0–100, counting partial progress on percentage sub-stages.
    pub percent: u8,
}

/// Read-only view returned by every engine operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionSnapshot {
    pub entity_id: Uuid,
    pub entity_kind: EntityKind,
    pub pid: Option<String>,
    pub current_stage: String,
    pub current_stage_name: Option<String>,
    pub entity_complete: bool,
    pub completed_sub_stages: Vec<String>,
    pub sub_stage_percentage: BTreeMap<String, u8>,
    pub hold_status: HoldStatus,
    pub hold_reason: Option<String>,
    pub groups: Vec<GroupProgress>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressionSnapshot {
    pub fn of(state: &ProgressionState, catalog: &StageCatalog) -> Self {
        let groups = catalog
            .groups()
            .iter()
            .map(|g| {
                let subs: Vec<_> = catalog
                    .ordered_sub_stages()
                    .iter()
                    .filter(|s| s.group_id == g.id)
                    .collect();
                let total = subs.len() as u32;
                let completed = subs.iter().filter(|s| state.is_completed(&s.id)).count() as u32;
                // Fractional credit for an in-flight percentage sub-stage.
                let earned: f64 = subs
                    .iter()
                    .map(|s| {
                        if state.is_completed(&s.id) {
                            1.0
                        } else if s.kind == SubStageKind::Percentage {
                            f64::from(state.percentage_of(&s.id)) / 100.0
                        } else {
                            0.0
                        }
                    })
                    .sum();
                let percent = if total == 0 {
                    0
                } else {
                    ((earned / f64::from(total)) * 100.0).round() as u8
                };
                GroupProgress {
                    group_id: g.id.clone(),
                    name: g.name.clone(),
                    total,
                    completed,
                    percent,
                }
            })
            .collect();

        Self {
            entity_id: state.entity_id,
            entity_kind: state.entity_kind,
            pid: state.pid.clone(),
            current_stage: state.current_stage.clone(),
            current_stage_name: catalog.group(&state.current_stage).map(|g| g.name.clone()),
            entity_complete: state.entity_complete,
            completed_sub_stages: state.completed_sub_stages.clone(),
            sub_stage_percentage: state.sub_stage_percentage.clone(),
            hold_status: state.hold_status,
            hold_reason: state.hold_reason.clone(),
            groups,
            updated_at: state.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_project() -> ProgressionState {
        ProgressionState::new(
            Uuid::new_v4(),
            EntityKind::Project,
            Some("ARK-1042".to_string()),
            "design".to_string(),
        )
    }

    #[test]
    fn new_state_starts_active_and_empty() {
        let state = fresh_project();
        assert_eq!(state.hold_status, HoldStatus::Active);
        assert!(state.completed_sub_stages.is_empty());
        assert!(state.sub_stage_percentage.is_empty());
        assert!(!state.entity_complete);
        assert_eq!(state.current_stage, "design");
    }

    #[test]
    fn display_label_prefers_pid() {
        let mut state = fresh_project();
        assert_eq!(state.display_label(), "Project ARK-1042");
        state.pid = None;
        assert!(state.display_label().starts_with("Project "));
    }

    #[test]
    fn set_hold_overwrites_previous_reason() {
        let mut state = fresh_project();
        state.set_hold(HoldStatus::Hold, "client travelling".into(), "Priya".into());
        state.set_hold(HoldStatus::Active, "client back".into(), "Priya".into());
        assert_eq!(state.hold_reason.as_deref(), Some("client back"));
        assert_eq!(state.hold_status, HoldStatus::Active);
    }

    #[test]
    fn snapshot_counts_partial_percentage_progress() {
        let catalog = StageCatalog::project();
        let mut state = fresh_project();
        // Complete all of design, then half of the non-modular works.
        for sub in catalog.ordered_sub_stages() {
            if sub.group_id == "design" {
                state.completed_sub_stages.push(sub.id.clone());
            }
        }
        state.sub_stage_percentage.insert("non_modular_works".into(), 50);

        let snapshot = ProgressionSnapshot::of(&state, &catalog);
        let design = &snapshot.groups[0];
        assert_eq!(design.percent, 100);
        assert_eq!(design.completed, design.total);

        let production = &snapshot.groups[1];
        assert_eq!(production.completed, 0);
        // 0.5 of 11 sub-stages ≈ 5%.
        assert_eq!(production.percent, 5);
    }

    #[test]
    fn state_serde_round_trip() {
        let mut state = fresh_project();
        state.completed_sub_stages.push("design_kickoff".into());
        state.sub_stage_percentage.insert("non_modular_works".into(), 30);
        let json = serde_json::to_string(&state).unwrap();
        let back: ProgressionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.completed_sub_stages, state.completed_sub_stages);
        assert_eq!(back.percentage_of("non_modular_works"), 30);
        assert_eq!(back.hold_status, HoldStatus::Active);
    }
}

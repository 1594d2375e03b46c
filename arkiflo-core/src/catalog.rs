//! Stage Catalog
//!
//! Canonical ordered definition of milestone groups and sub-stages for a
//! given entity kind. Read-only at runtime — catalog changes are a
//! configuration/deployment concern, loaded once and injected into the
//! engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of entity whose progress is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Lead,
    Project,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "Lead",
            Self::Project => "Project",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How progress on a sub-stage is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubStageKind {
    /// Binary complete / not complete.
    Discrete,
    /// 0–100 tracked; auto-completes when the value reaches 100.
    Percentage,
}

/// A coarse milestone phase (e.g. Design Finalization, Production).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneGroup {
    pub id: String,
    pub name: String,
    /// Explicit ordering key; not an array index.
    pub order: u32,
}

/// The smallest unit of progress within a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubStageDef {
    pub id: String,
    pub name: String,
    pub group_id: String,
    /// Ordering key, strictly increasing across the whole catalog.
    pub order: u32,
    pub kind: SubStageKind,
    /// Expected turnaround in days. Carried for the delay-labeling feature;
    /// the progression engine never reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tat_days: Option<u32>,
}

/// Validation failures when constructing or loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog has no groups or no sub-stages")]
    Empty,
    #[error("duplicate id '{0}' in catalog")]
    DuplicateId(String),
    #[error("sub-stage '{sub_stage}' references unknown group '{group_id}'")]
    UnknownGroup { sub_stage: String, group_id: String },
    #[error("order {order} of '{id}' is not strictly increasing")]
    OrderNotIncreasing { id: String, order: u32 },
    #[error("failed to parse catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Immutable ordered stage/sub-stage taxonomy for one entity kind.
///
/// Both `groups` and `sub_stages` are held sorted by their `order` key, so
/// there is exactly one legal "next" sub-stage at any point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CatalogDoc", into = "CatalogDoc")]
pub struct StageCatalog {
    entity_kind: EntityKind,
    groups: Vec<MilestoneGroup>,
    sub_stages: Vec<SubStageDef>,
}

/// Raw serde shape; validation happens in `StageCatalog::new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogDoc {
    entity_kind: EntityKind,
    groups: Vec<MilestoneGroup>,
    sub_stages: Vec<SubStageDef>,
}

impl TryFrom<CatalogDoc> for StageCatalog {
    type Error = CatalogError;

    fn try_from(doc: CatalogDoc) -> Result<Self, Self::Error> {
        StageCatalog::new(doc.entity_kind, doc.groups, doc.sub_stages)
    }
}

impl From<StageCatalog> for CatalogDoc {
    fn from(catalog: StageCatalog) -> Self {
        CatalogDoc {
            entity_kind: catalog.entity_kind,
            groups: catalog.groups,
            sub_stages: catalog.sub_stages,
        }
    }
}

impl StageCatalog {
    /// Build a catalog, sorting by order key and validating the invariants:
    /// unique ids, strictly increasing orders, resolvable group references.
    pub fn new(
        entity_kind: EntityKind,
        mut groups: Vec<MilestoneGroup>,
        mut sub_stages: Vec<SubStageDef>,
    ) -> Result<Self, CatalogError> {
        if groups.is_empty() || sub_stages.is_empty() {
            return Err(CatalogError::Empty);
        }

        groups.sort_by_key(|g| g.order);
        sub_stages.sort_by_key(|s| s.order);

        let mut seen = std::collections::HashSet::new();
        let mut last_order = None;
        for group in &groups {
            if !seen.insert(group.id.clone()) {
                return Err(CatalogError::DuplicateId(group.id.clone()));
            }
            if last_order.is_some_and(|o| group.order <= o) {
                return Err(CatalogError::OrderNotIncreasing {
                    id: group.id.clone(),
                    order: group.order,
                });
            }
            last_order = Some(group.order);
        }

        let mut last_order = None;
        for sub in &sub_stages {
            if !seen.insert(sub.id.clone()) {
                return Err(CatalogError::DuplicateId(sub.id.clone()));
            }
            if !groups.iter().any(|g| g.id == sub.group_id) {
                return Err(CatalogError::UnknownGroup {
                    sub_stage: sub.id.clone(),
                    group_id: sub.group_id.clone(),
                });
            }
            if last_order.is_some_and(|o| sub.order <= o) {
                return Err(CatalogError::OrderNotIncreasing {
                    id: sub.id.clone(),
                    order: sub.order,
                });
            }
            last_order = Some(sub.order);
        }

        Ok(Self {
            entity_kind,
            groups,
            sub_stages,
        })
    }

    /// Load a catalog from a YAML definition file.
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDoc = serde_yaml::from_str(yaml)?;
        Self::new(doc.entity_kind, doc.groups, doc.sub_stages)
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    pub fn groups(&self) -> &[MilestoneGroup] {
        &self.groups
    }

    /// All sub-stages in catalog order — the total order used by every
    /// forward-only check.
    pub fn ordered_sub_stages(&self) -> &[SubStageDef] {
        &self.sub_stages
    }

    pub fn sub_stage(&self, id: &str) -> Option<&SubStageDef> {
        self.sub_stages.iter().find(|s| s.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&MilestoneGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn group_of(&self, sub_stage_id: &str) -> Option<&MilestoneGroup> {
        let sub = self.sub_stage(sub_stage_id)?;
        self.group(&sub.group_id)
    }

    /// The first sub-stage (in catalog order) not yet completed.
    /// `None` means the entity is fully complete.
    pub fn next_sub_stage(&self, completed: &[String]) -> Option<&SubStageDef> {
        self.sub_stages
            .iter()
            .find(|s| !completed.iter().any(|c| c == &s.id))
    }

    /// True iff every sub-stage of the group is in the completed set.
    pub fn is_group_complete(&self, group_id: &str, completed: &[String]) -> bool {
        self.sub_stages
            .iter()
            .filter(|s| s.group_id == group_id)
            .all(|s| completed.iter().any(|c| c == &s.id))
    }

    pub fn first_group(&self) -> &MilestoneGroup {
        // Non-empty by construction.
        &self.groups[0]
    }

    /// The group that follows `group_id` in catalog order, if any.
    pub fn group_after(&self, group_id: &str) -> Option<&MilestoneGroup> {
        let pos = self.groups.iter().position(|g| g.id == group_id)?;
        self.groups.get(pos + 1)
    }

    /// Built-in Lead catalog: a single flat pre-sales funnel.
    pub fn lead() -> Self {
        let groups = vec![group("lead_funnel", "Lead Funnel", 1)];
        let sub_stages = vec![
            discrete("lead_created", "Lead Created", "lead_funnel", 1, Some(0)),
            discrete(
                "bc_call_completed",
                "BC Call Completed",
                "lead_funnel",
                2,
                Some(1),
            ),
            discrete("boq_shared", "BOQ Shared", "lead_funnel", 3, Some(3)),
            discrete("site_meeting", "Site Meeting", "lead_funnel", 4, Some(5)),
            discrete(
                "revised_boq_shared",
                "Revised BOQ Shared",
                "lead_funnel",
                5,
                Some(2),
            ),
        ];
        // Static data; orders are literal and strictly increasing.
        Self::new(EntityKind::Lead, groups, sub_stages)
            .unwrap_or_else(|e| panic!("built-in lead catalog invalid: {e}"))
    }

    /// Built-in Project catalog: Design → Production → Delivery →
    /// Installation → Handover.
    pub fn project() -> Self {
        let groups = vec![
            group("design", "Design Finalization", 1),
            group("production", "Production", 2),
            group("delivery", "Delivery", 3),
            group("installation", "Installation", 4),
            group("handover", "Handover", 5),
        ];
        let sub_stages = vec![
            discrete("design_kickoff", "Design Kickoff Meeting", "design", 1, Some(2)),
            discrete("site_measurement", "Site Measurement Validated", "design", 2, Some(3)),
            discrete("concept_presentation", "Concept Presentation", "design", 3, Some(5)),
            discrete("concept_signoff", "Revised Concept Signed Off", "design", 4, Some(4)),
            discrete("material_selection", "Material & Finish Selection", "design", 5, Some(3)),
            discrete("renders_approved", "3D Renders Approved", "design", 6, Some(5)),
            discrete("working_drawings", "Working Drawings Ready", "design", 7, Some(4)),
            discrete("boq_frozen", "BOQ Frozen", "design", 8, Some(2)),
            discrete("final_quote_approved", "Final Quote Approved", "design", 9, Some(2)),
            discrete("advance_received", "Advance Payment Received", "design", 10, Some(3)),
            discrete("design_handoff", "Design Handoff to Production", "design", 11, Some(1)),
            discrete("production_kickoff", "Production Kickoff", "production", 12, Some(1)),
            discrete("material_procurement", "Material Procurement", "production", 13, Some(7)),
            discrete("carcass_fabrication", "Carcass Fabrication", "production", 14, Some(10)),
            discrete("shutter_fabrication", "Shutter Fabrication", "production", 15, Some(10)),
            discrete("edge_finishing", "Edge Banding & Finishing", "production", 16, Some(4)),
            discrete("hardware_fitment", "Hardware Fitment", "production", 17, Some(3)),
            discrete("factory_qc", "Factory Quality Check", "production", 18, Some(2)),
            SubStageDef {
                id: "non_modular_works".into(),
                name: "Non-Modular Dependency Works".into(),
                group_id: "production".into(),
                order: 19,
                kind: SubStageKind::Percentage,
                tat_days: Some(21),
            },
            discrete("packing", "Packing", "production", 20, Some(2)),
            discrete("dispatch_clearance", "Dispatch Clearance", "production", 21, Some(1)),
            discrete("production_signoff", "Production Sign-Off", "production", 22, Some(1)),
            discrete("delivery_scheduled", "Delivery Scheduled", "delivery", 23, Some(2)),
            discrete("material_dispatched", "Material Dispatched", "delivery", 24, Some(1)),
            discrete("material_received", "Material Received at Site", "delivery", 25, Some(2)),
            discrete("delivery_verification", "Delivery Verification", "delivery", 26, Some(1)),
            discrete("installation_kickoff", "Installation Kickoff", "installation", 27, Some(1)),
            discrete("carcass_installation", "Carcass Installation", "installation", 28, Some(5)),
            discrete("shutter_alignment", "Shutter Alignment", "installation", 29, Some(3)),
            discrete("hardware_accessories", "Hardware & Accessories", "installation", 30, Some(3)),
            discrete("deep_cleaning", "Deep Cleaning", "installation", 31, Some(1)),
            discrete("installation_qc", "Installation Quality Check", "installation", 32, Some(2)),
            discrete("snag_list", "Snag List Prepared", "handover", 33, Some(1)),
            discrete("snag_rectification", "Snag Rectification", "handover", 34, Some(5)),
            discrete("final_walkthrough", "Final Quality Walkthrough", "handover", 35, Some(1)),
            discrete("final_payment", "Final Payment Received", "handover", 36, Some(3)),
            discrete("warranty_docs", "Warranty Documents Shared", "handover", 37, Some(1)),
            discrete("client_training", "Client Training", "handover", 38, Some(1)),
            discrete("handover_photos", "Handover Photos Captured", "handover", 39, Some(1)),
            discrete("closed", "Closed", "handover", 40, Some(1)),
        ];
        Self::new(EntityKind::Project, groups, sub_stages)
            .unwrap_or_else(|e| panic!("built-in project catalog invalid: {e}"))
    }
}

fn group(id: &str, name: &str, order: u32) -> MilestoneGroup {
    MilestoneGroup {
        id: id.into(),
        name: name.into(),
        order,
    }
}

fn discrete(id: &str, name: &str, group_id: &str, order: u32, tat_days: Option<u32>) -> SubStageDef {
    SubStageDef {
        id: id.into(),
        name: name.into(),
        group_id: group_id.into(),
        order,
        kind: SubStageKind::Discrete,
        tat_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalogs_are_valid() {
        let lead = StageCatalog::lead();
        assert_eq!(lead.entity_kind(), EntityKind::Lead);
        assert_eq!(lead.ordered_sub_stages().len(), 5);

        let project = StageCatalog::project();
        assert_eq!(project.groups().len(), 5);
        assert_eq!(project.ordered_sub_stages().len(), 40);
        let last = project.ordered_sub_stages().last().unwrap();
        assert_eq!(last.name, "Closed");
        assert_eq!(
            project.sub_stage("non_modular_works").unwrap().kind,
            SubStageKind::Percentage
        );
    }

    #[test]
    fn next_sub_stage_follows_catalog_order() {
        let lead = StageCatalog::lead();
        assert_eq!(lead.next_sub_stage(&[]).unwrap().id, "lead_created");

        let completed = vec!["lead_created".to_string(), "bc_call_completed".to_string()];
        assert_eq!(lead.next_sub_stage(&completed).unwrap().id, "boq_shared");

        let all: Vec<String> = lead
            .ordered_sub_stages()
            .iter()
            .map(|s| s.id.clone())
            .collect();
        assert!(lead.next_sub_stage(&all).is_none());
    }

    #[test]
    fn group_completion_requires_every_sub_stage() {
        let project = StageCatalog::project();
        let design: Vec<String> = project
            .ordered_sub_stages()
            .iter()
            .filter(|s| s.group_id == "design")
            .map(|s| s.id.clone())
            .collect();

        let mut partial = design.clone();
        partial.pop();
        assert!(!project.is_group_complete("design", &partial));
        assert!(project.is_group_complete("design", &design));
    }

    #[test]
    fn group_after_walks_project_phases() {
        let project = StageCatalog::project();
        assert_eq!(project.group_after("design").unwrap().id, "production");
        assert_eq!(project.group_after("installation").unwrap().id, "handover");
        assert!(project.group_after("handover").is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let groups = vec![group("g", "G", 1)];
        let subs = vec![
            discrete("a", "A", "g", 1, None),
            discrete("a", "A again", "g", 2, None),
        ];
        assert!(matches!(
            StageCatalog::new(EntityKind::Lead, groups, subs),
            Err(CatalogError::DuplicateId(_))
        ));
    }

    #[test]
    fn rejects_unknown_group_reference() {
        let groups = vec![group("g", "G", 1)];
        let subs = vec![discrete("a", "A", "missing", 1, None)];
        assert!(matches!(
            StageCatalog::new(EntityKind::Lead, groups, subs),
            Err(CatalogError::UnknownGroup { .. })
        ));
    }

    #[test]
    fn rejects_colliding_orders() {
        let groups = vec![group("g", "G", 1)];
        let subs = vec![
            discrete("a", "A", "g", 3, None),
            discrete("b", "B", "g", 3, None),
        ];
        assert!(matches!(
            StageCatalog::new(EntityKind::Lead, groups, subs),
            Err(CatalogError::OrderNotIncreasing { .. })
        ));
    }

    #[test]
    fn yaml_round_trip() {
        let yaml = r#"
entity_kind: lead
groups:
  - id: funnel
    name: Funnel
    order: 1
sub_stages:
  - id: created
    name: Created
    group_id: funnel
    order: 1
    kind: discrete
    tat_days: 1
  - id: call
    name: Call Done
    group_id: funnel
    order: 2
    kind: discrete
"#;
        let catalog = StageCatalog::from_yaml(yaml).unwrap();
        assert_eq!(catalog.ordered_sub_stages().len(), 2);
        assert_eq!(catalog.sub_stage("created").unwrap().tat_days, Some(1));
        assert!(catalog.sub_stage("call").unwrap().tat_days.is_none());
    }

    #[test]
    fn yaml_rejects_invalid_catalog() {
        let yaml = r#"
entity_kind: lead
groups:
  - id: funnel
    name: Funnel
    order: 1
sub_stages:
  - id: a
    name: A
    group_id: nope
    order: 1
    kind: discrete
"#;
        assert!(StageCatalog::from_yaml(yaml).is_err());
    }
}

//! Hold / lifecycle control
//!
//! Permission and transition rules for the Active / Hold / Deactivated
//! status. The engine enforces the freeze itself (non-Active rejects all
//! progression mutations); this module owns who may flip the status and
//! what each action targets.

use serde::{Deserialize, Serialize};

use crate::actor::Capability;
use crate::state::HoldStatus;
use crate::EngineError;

/// Requested lifecycle action. Every action carries a mandatory reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldAction {
    Hold,
    Activate,
    Deactivate,
}

impl HoldAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }

    /// Status this action moves the entity to.
    pub fn target_status(&self) -> HoldStatus {
        match self {
            Self::Hold => HoldStatus::Hold,
            Self::Activate => HoldStatus::Active,
            Self::Deactivate => HoldStatus::Deactivated,
        }
    }
}

impl std::fmt::Display for HoldAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HoldAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hold" => Ok(Self::Hold),
            "activate" => Ok(Self::Activate),
            "deactivate" => Ok(Self::Deactivate),
            _ => Err(format!("Unknown hold action: {}", s)),
        }
    }
}

/// Reasons must carry content; whitespace does not count.
pub(crate) fn validate_reason(reason: &str) -> Result<(), EngineError> {
    if reason.trim().is_empty() {
        return Err(EngineError::ReasonRequired);
    }
    Ok(())
}

/// Capability gate per action. Base actors may only place an entity on hold;
/// any transition out of Deactivated takes elevated access — otherwise a
/// hold-then-activate pair would route around the reactivation rule.
pub(crate) fn authorize(
    action: HoldAction,
    capability: Capability,
    current: HoldStatus,
) -> Result<(), EngineError> {
    let allowed = if current == HoldStatus::Deactivated {
        capability.is_elevated()
    } else {
        match action {
            HoldAction::Hold => true,
            HoldAction::Activate | HoldAction::Deactivate => capability.can_manage_hold(),
        }
    };
    if allowed {
        Ok(())
    } else {
        Err(EngineError::Forbidden { capability, action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_actor_may_only_hold() {
        assert!(authorize(HoldAction::Hold, Capability::Base, HoldStatus::Active).is_ok());
        assert!(matches!(
            authorize(HoldAction::Activate, Capability::Base, HoldStatus::Hold),
            Err(EngineError::Forbidden { .. })
        ));
        assert!(matches!(
            authorize(HoldAction::Deactivate, Capability::Base, HoldStatus::Active),
            Err(EngineError::Forbidden { .. })
        ));
    }

    #[test]
    fn managerial_actor_manages_hold_and_activate() {
        assert!(authorize(HoldAction::Activate, Capability::Managerial, HoldStatus::Hold).is_ok());
        assert!(
            authorize(HoldAction::Deactivate, Capability::Managerial, HoldStatus::Active).is_ok()
        );
    }

    #[test]
    fn reactivating_deactivated_takes_elevated() {
        assert!(matches!(
            authorize(
                HoldAction::Activate,
                Capability::Managerial,
                HoldStatus::Deactivated
            ),
            Err(EngineError::Forbidden { .. })
        ));
        assert!(authorize(
            HoldAction::Activate,
            Capability::Elevated,
            HoldStatus::Deactivated
        )
        .is_ok());
    }

    #[test]
    fn deactivated_cannot_be_parked_on_hold_by_lower_tiers() {
        // Hold then Activate must not launder around the elevated-only
        // reactivation rule.
        for cap in [Capability::Base, Capability::Managerial] {
            assert!(matches!(
                authorize(HoldAction::Hold, cap, HoldStatus::Deactivated),
                Err(EngineError::Forbidden { .. })
            ));
        }
        assert!(authorize(HoldAction::Hold, Capability::Elevated, HoldStatus::Deactivated).is_ok());
    }

    #[test]
    fn reason_must_be_non_empty() {
        assert!(validate_reason("client travelling").is_ok());
        assert!(matches!(
            validate_reason("   "),
            Err(EngineError::ReasonRequired)
        ));
        assert!(matches!(validate_reason(""), Err(EngineError::ReasonRequired)));
    }

    #[test]
    fn actions_map_to_statuses() {
        assert_eq!(HoldAction::Hold.target_status(), HoldStatus::Hold);
        assert_eq!(HoldAction::Activate.target_status(), HoldStatus::Active);
        assert_eq!(HoldAction::Deactivate.target_status(), HoldStatus::Deactivated);
        assert_eq!("deactivate".parse::<HoldAction>().unwrap(), HoldAction::Deactivate);
    }
}

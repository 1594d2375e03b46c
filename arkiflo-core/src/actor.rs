//! Actors and capabilities
//!
//! The caller resolves a user to a capability before invoking the engine;
//! the capability travels on the `Actor` value.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability tier controlling hold actions, rollback, and percentage
/// corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Assigned doer: may progress work and place an entity on hold.
    Base,
    /// May additionally activate and deactivate entities.
    Managerial,
    /// Administrative: may also roll back stages, decrease percentages,
    /// and reactivate deactivated entities.
    Elevated,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Managerial => "managerial",
            Self::Elevated => "elevated",
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Elevated)
    }

    pub fn can_manage_hold(&self) -> bool {
        matches!(self, Self::Managerial | Self::Elevated)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Self::Base),
            "managerial" => Ok(Self::Managerial),
            "elevated" => Ok(Self::Elevated),
            _ => Err(format!("Unknown capability: {}", s)),
        }
    }
}

/// The user performing an operation, with their resolved capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub name: String,
    pub capability: Capability,
}

impl Actor {
    pub fn new(user_id: Uuid, name: impl Into<String>, capability: Capability) -> Self {
        Self {
            user_id,
            name: name.into(),
            capability,
        }
    }
}

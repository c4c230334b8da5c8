use serde::Serialize;

use crate::models::{Mission, MissionOutcome, User};

// -- Identity --

/// Outcome of registering a name. A taken name is not an error: the existing
/// identity is handed back untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "user", rename_all = "snake_case")]
pub enum Registration {
    Created(User),
    AlreadyExists(User),
}

impl Registration {
    pub fn user(&self) -> &User {
        match self {
            Self::Created(user) | Self::AlreadyExists(user) => user,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

// -- Missions --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    Joined,
    /// The membership row already existed; nothing was written.
    AlreadyMember,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionEnded {
    pub mission: Mission,
    pub members: Vec<String>,
    pub outcome: MissionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionDeleted {
    pub mission: Mission,
    /// Membership rows removed together with the mission.
    pub members_removed: usize,
}

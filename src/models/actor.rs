use serde::{Deserialize, Serialize};
use std::fmt;

const SYSTEM_ACTOR: &str = "system";
const MAX_ACTOR_LEN: usize = 255;

/// Identity recorded as the requester and confirmer of an order change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    /// Builds an actor from caller-supplied text; blank input yields `None`.
    pub fn new(id: impl AsRef<str>) -> Option<Self> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.chars().take(MAX_ACTOR_LEN).collect()))
    }

    pub fn system() -> Self {
        Self(SYSTEM_ACTOR.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

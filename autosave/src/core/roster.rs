//! The fixed two-member agent roster.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a roster member. The roster is closed: there are exactly two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentId {
    #[default]
    Strategist,
    Builder,
}

impl AgentId {
    pub const ALL: [AgentId; 2] = [AgentId::Strategist, AgentId::Builder];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentId::Strategist => "strategist",
            AgentId::Builder => "builder",
        }
    }

    /// The other roster member.
    pub fn other(self) -> AgentId {
        match self {
            AgentId::Strategist => AgentId::Builder,
            AgentId::Builder => AgentId::Strategist,
        }
    }

    /// Strict parse: only the exact lowercase ids are accepted.
    pub fn parse(raw: &str) -> Option<AgentId> {
        match raw {
            "strategist" => Some(AgentId::Strategist),
            "builder" => Some(AgentId::Builder),
            _ => None,
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A roster member's commit identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
    pub email: String,
}

impl AgentProfile {
    pub fn default_for(id: AgentId) -> Self {
        match id {
            AgentId::Strategist => Self {
                id,
                name: "Strategist".to_string(),
                email: "strategist@users.noreply.github.com".to_string(),
            },
            AgentId::Builder => Self {
                id,
                name: "Builder".to_string(),
                email: "builder@users.noreply.github.com".to_string(),
            },
        }
    }
}

/// Both roster members, keyed by slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub strategist: AgentProfile,
    pub builder: AgentProfile,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            strategist: AgentProfile::default_for(AgentId::Strategist),
            builder: AgentProfile::default_for(AgentId::Builder),
        }
    }
}

impl Roster {
    pub fn profile(&self, id: AgentId) -> &AgentProfile {
        match id {
            AgentId::Strategist => &self.strategist,
            AgentId::Builder => &self.builder,
        }
    }
}

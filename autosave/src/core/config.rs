//! Autosave configuration model and its total normalization.
//!
//! The persisted document is user-editable and may be partial, stale, or
//! hand-broken. [`normalize`] maps any JSON value onto a fully populated
//! [`AutosaveConfig`]; it never fails and `normalize(to_value(normalize(x)))`
//! equals `normalize(x)`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::legacy;
use crate::core::roster::{AgentId, AgentProfile, Roster};

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_COMMIT_PREFIX: &str = "finance-autosave";

/// Result recorded for the most recent cycle that reached the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    Pushed,
    NoChanges,
    Error,
}

impl RunResult {
    pub fn as_str(self) -> &'static str {
        match self {
            RunResult::Pushed => "pushed",
            RunResult::NoChanges => "no_changes",
            RunResult::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<RunResult> {
        match raw {
            "pushed" => Some(RunResult::Pushed),
            "no_changes" => Some(RunResult::NoChanges),
            "error" => Some(RunResult::Error),
            _ => None,
        }
    }
}

/// Persisted autosave settings plus the audit trail of the last cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutosaveConfig {
    pub enabled: bool,
    pub remote: String,
    pub branch: String,
    /// Rotate the commit author between roster members after each push.
    pub alternating_agents: bool,
    /// Ask the roster for a commit hint before committing.
    pub consult_between_agents: bool,
    /// Whose turn is next when alternating.
    pub next_agent_id: AgentId,
    pub agents: Roster,
    pub commit_prefix: String,
    pub last_actor_id: Option<AgentId>,
    pub last_consultation: Option<String>,
    pub last_run_at: Option<String>,
    pub last_result: Option<RunResult>,
    pub last_error: Option<String>,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote: DEFAULT_REMOTE.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            alternating_agents: true,
            consult_between_agents: true,
            next_agent_id: AgentId::Strategist,
            agents: Roster::default(),
            commit_prefix: DEFAULT_COMMIT_PREFIX.to_string(),
            last_actor_id: None,
            last_consultation: None,
            last_run_at: None,
            last_result: None,
            last_error: None,
        }
    }
}

impl AutosaveConfig {
    /// Normalize arbitrary JSON into a config. Alias for [`normalize`].
    pub fn from_value(input: &Value) -> Self {
        normalize(input)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The roster member who authors the next commit.
    pub fn active_agent(&self) -> AgentId {
        if self.alternating_agents {
            self.next_agent_id
        } else {
            AgentId::Strategist
        }
    }

    /// Apply a user edit and renormalize.
    ///
    /// Top-level keys in `patch` replace current values, except `agents`,
    /// whose members are merged field by field so editing one profile keeps
    /// the other. A non-object patch leaves the config unchanged.
    pub fn merged_with(&self, patch: &Value) -> Self {
        let mut base = match self.to_value() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let Some(patch) = patch.as_object() else {
            return normalize(&Value::Object(base));
        };
        for (key, value) in patch {
            if key == "agents" {
                merge_agents(&mut base, value);
            } else {
                base.insert(key.clone(), value.clone());
            }
        }
        normalize(&Value::Object(base))
    }
}

fn merge_agents(base: &mut Map<String, Value>, patch: &Value) {
    let Some(patch_agents) = patch.as_object() else {
        base.insert("agents".to_string(), patch.clone());
        return;
    };
    let mut agents = base
        .get("agents")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    for (member, fields) in patch_agents {
        match (agents.get_mut(member), fields.as_object()) {
            (Some(Value::Object(current)), Some(fields)) => {
                for (field, value) in fields {
                    current.insert(field.clone(), value.clone());
                }
            }
            _ => {
                agents.insert(member.clone(), fields.clone());
            }
        }
    }
    base.insert("agents".to_string(), Value::Object(agents));
}

/// Map any JSON value onto a fully populated config.
pub fn normalize(input: &Value) -> AutosaveConfig {
    let source = legacy::upgrade(input);
    let defaults = AutosaveConfig::default();
    let agents = source.get("agents").and_then(Value::as_object);

    AutosaveConfig {
        enabled: flag(source.get("enabled"), false),
        remote: text(source.get("remote")).unwrap_or(defaults.remote),
        branch: text(source.get("branch")).unwrap_or(defaults.branch),
        alternating_agents: flag(source.get("alternatingAgents"), defaults.alternating_agents),
        consult_between_agents: flag(
            source.get("consultBetweenAgents"),
            defaults.consult_between_agents,
        ),
        next_agent_id: match text(source.get("nextAgentId")).as_deref() {
            Some("builder") => AgentId::Builder,
            _ => AgentId::Strategist,
        },
        agents: Roster {
            strategist: profile(
                AgentId::Strategist,
                agents.and_then(|a| a.get("strategist")),
            ),
            builder: profile(AgentId::Builder, agents.and_then(|a| a.get("builder"))),
        },
        commit_prefix: text(source.get("commitPrefix")).unwrap_or(defaults.commit_prefix),
        last_actor_id: text(source.get("lastActorId")).and_then(|s| AgentId::parse(&s)),
        last_consultation: text(source.get("lastConsultation")),
        last_run_at: text(source.get("lastRunAt")),
        last_result: text(source.get("lastResult")).and_then(|s| RunResult::parse(&s)),
        last_error: text(source.get("lastError")),
    }
}

fn profile(slot: AgentId, source: Option<&Value>) -> AgentProfile {
    let fallback = AgentProfile::default_for(slot);
    let source = source.and_then(Value::as_object);
    AgentProfile {
        id: slot,
        name: text(source.and_then(|s| s.get("name"))).unwrap_or(fallback.name),
        email: text(source.and_then(|s| s.get("email"))).unwrap_or(fallback.email),
    }
}

/// Trimmed, non-empty string content.
fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Missing keys take the default; present keys use JSON truthiness.
fn flag(value: Option<&Value>, default: bool) -> bool {
    match value {
        None => default,
        Some(value) => truthy(value),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

//! Input adapter for older autosave documents.
//!
//! Schema v1 carried a single commit identity as flat `agentName` /
//! `agentEmail` keys. The current schema nests identities under
//! `agents.<id>`. [`upgrade`] rewrites any supported older shape into the
//! current one so [`crate::core::config::normalize`] only ever sees one shape.
//! New schema revisions add a step here rather than touching normalization.

use serde_json::{Map, Value};

const LEGACY_NAME_KEY: &str = "agentName";
const LEGACY_EMAIL_KEY: &str = "agentEmail";

/// Input schema revision detected from the keys present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaRevision {
    /// Flat single-agent identity.
    SingleAgent,
    /// Nested two-member roster.
    Roster,
}

pub fn detect(source: &Map<String, Value>) -> SchemaRevision {
    if source.contains_key(LEGACY_NAME_KEY) || source.contains_key(LEGACY_EMAIL_KEY) {
        SchemaRevision::SingleAgent
    } else {
        SchemaRevision::Roster
    }
}

/// Convert any input value into a current-shape object map.
///
/// Non-object input becomes an empty map. Legacy identity values are folded
/// into `agents.strategist` only where the nested field is absent or blank,
/// then the legacy keys are dropped.
pub fn upgrade(input: &Value) -> Map<String, Value> {
    let mut source = match input {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if detect(&source) == SchemaRevision::Roster {
        return source;
    }

    let legacy_name = source.remove(LEGACY_NAME_KEY);
    let legacy_email = source.remove(LEGACY_EMAIL_KEY);
    fold_into_strategist(&mut source, "name", legacy_name.as_ref());
    fold_into_strategist(&mut source, "email", legacy_email.as_ref());
    source
}

fn fold_into_strategist(source: &mut Map<String, Value>, field: &str, legacy: Option<&Value>) {
    let Some(text) = legacy.and_then(non_blank) else {
        return;
    };
    let Some(agents) = object_entry(source, "agents") else {
        return;
    };
    let Some(strategist) = object_entry(agents, "strategist") else {
        return;
    };
    if strategist.get(field).and_then(non_blank).is_some() {
        return;
    }
    strategist.insert(field.to_string(), Value::String(text.to_string()));
}

/// Get `key` as an object, replacing any non-object value.
fn object_entry<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
) -> Option<&'a mut Map<String, Value>> {
    if !map.get(key).is_some_and(Value::is_object) {
        map.insert(key.to_string(), Value::Object(Map::new()));
    }
    map.get_mut(key).and_then(Value::as_object_mut)
}

fn non_blank(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_shape_passes_through() {
        let input = json!({"enabled": true, "agents": {"builder": {"name": "B"}}});
        let out = upgrade(&input);
        assert_eq!(Value::Object(out), input);
    }

    #[test]
    fn legacy_keys_fold_into_strategist() {
        let input = json!({"agentName": " Solo ", "agentEmail": "solo@example.com"});
        let out = upgrade(&input);
        assert!(!out.contains_key("agentName"));
        assert!(!out.contains_key("agentEmail"));
        assert_eq!(out["agents"]["strategist"]["name"], "Solo");
        assert_eq!(out["agents"]["strategist"]["email"], "solo@example.com");
    }

    #[test]
    fn nested_values_win_over_legacy_keys() {
        let input = json!({
            "agentName": "Legacy",
            "agents": {"strategist": {"name": "Nested", "email": "  "}},
            "agentEmail": "legacy@example.com"
        });
        let out = upgrade(&input);
        assert_eq!(out["agents"]["strategist"]["name"], "Nested");
        assert_eq!(out["agents"]["strategist"]["email"], "legacy@example.com");
    }

    #[test]
    fn blank_legacy_values_are_dropped() {
        let out = upgrade(&json!({"agentName": "   ", "agentEmail": 42}));
        assert!(out.is_empty());
    }

    #[test]
    fn non_object_agents_is_replaced() {
        let out = upgrade(&json!({"agentName": "Solo", "agents": "broken"}));
        assert_eq!(out["agents"]["strategist"]["name"], "Solo");
    }

    #[test]
    fn non_object_input_is_empty() {
        assert!(upgrade(&Value::Null).is_empty());
        assert!(upgrade(&json!([1, 2])).is_empty());
    }
}

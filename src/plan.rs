//! Planning: turn a proposed configuration into the state the host should
//! expect after apply.

use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeType, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Plan a resource against its schema.
///
/// - absent optional attributes get their schema default;
/// - computed attributes the proposal leaves unset are carried over from
///   `prior` (dropped again if the plan replaces the resource);
/// - set attributes are sorted and deduplicated;
/// - a change to a force-new attribute of an existing resource sets
///   `requires_replace`.
///
/// Attributes not declared in the schema are dropped from the planned state.
pub fn plan_resource(
    schema: &Schema,
    prior: Option<&Value>,
    proposed: &Value,
) -> Result<PlanResult, ProviderError> {
    let proposed = proposed
        .as_object()
        .ok_or_else(|| ProviderError::InvalidRequest("proposed state must be an object".into()))?;
    let prior = match prior {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            return Err(ProviderError::InvalidRequest(
                "prior state must be an object".into(),
            ))
        }
    };

    let mut planned = Map::new();
    let mut carried = Vec::new();
    for (name, attr) in &schema.attributes {
        let value = match present(proposed, name) {
            Some(value) => Some(normalize(attr, value.clone())),
            None if attr.flags.computed => {
                let previous = prior.and_then(|p| present(p, name)).cloned();
                if previous.is_some() {
                    carried.push(name.as_str());
                }
                previous.map(|v| normalize(attr, v))
            }
            None => attr.default.clone(),
        };
        if let Some(value) = value {
            planned.insert(name.clone(), value);
        }
    }

    let Some(prior) = prior else {
        let changes = planned
            .iter()
            .map(|(name, value)| AttributeChange::added(name.as_str(), value.clone()))
            .collect();
        return Ok(PlanResult::with_changes(Value::Object(planned), changes, false));
    };

    let mut changes = Vec::new();
    let mut requires_replace = false;
    for (name, attr) in &schema.attributes {
        if carried.contains(&name.as_str()) {
            continue;
        }
        let before = present(prior, name).map(|v| normalize(attr, v.clone()));
        let after = planned.get(name).cloned();
        let change = match (before, after) {
            (None, None) => continue,
            (Some(before), Some(after)) if same_value(attr, &before, &after) => continue,
            (None, Some(after)) => AttributeChange::added(name.as_str(), after),
            (Some(before), None) => AttributeChange::removed(name.as_str(), before),
            (Some(before), Some(after)) => AttributeChange::modified(name.as_str(), before, after),
        };
        requires_replace |= attr.force_new;
        changes.push(change);
    }

    if requires_replace {
        for name in &carried {
            planned.remove(*name);
        }
    }

    let planned = Value::Object(planned);
    if changes.is_empty() {
        Ok(PlanResult::no_change(planned))
    } else {
        Ok(PlanResult::with_changes(planned, changes, requires_replace))
    }
}

fn present<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.get(name).filter(|v| !v.is_null())
}

/// `2` and `2.0` are the same float.
fn same_value(attr: &Attribute, before: &Value, after: &Value) -> bool {
    match (&attr.attr_type, before.as_f64(), after.as_f64()) {
        (AttributeType::Float64, Some(a), Some(b)) => a == b,
        _ => before == after,
    }
}

/// Sort and deduplicate set values so element order never shows up as a diff.
fn normalize(attr: &Attribute, value: Value) -> Value {
    match value {
        Value::Array(mut elements) if attr.attr_type.is_set() => {
            elements.sort_by_key(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            elements.dedup();
            Value::Array(elements)
        }
        other => other,
    }
}

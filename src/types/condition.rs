// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status conditions shared by the parent and child kinds.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(condition_type: &str, status: bool, reason: &str, message: impl Into<String>) -> Self {
        Condition {
            condition_type: condition_type.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Insert or replace the condition with the same type. Returns whether anything changed.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) if *existing == condition => false,
        Some(existing) => {
            *existing = condition;
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

pub fn remove_condition(conditions: &mut Vec<Condition>, condition_type: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.condition_type != condition_type);
    conditions.len() != before
}

/// Check a condition list for `type=True`
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    conditions
        .iter()
        .any(|c| c.condition_type == condition_type && c.is_true())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_appends_new_type() {
        let mut conditions = vec![];
        assert!(set_condition(
            &mut conditions,
            Condition::new("Ready", true, "Converged", "ok")
        ));
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_set_condition_same_value_is_noop() {
        let mut conditions = vec![Condition::new("Ready", true, "Converged", "ok")];
        assert!(!set_condition(
            &mut conditions,
            Condition::new("Ready", true, "Converged", "ok")
        ));
    }

    #[test]
    fn test_set_condition_replaces_in_place() {
        let mut conditions = vec![
            Condition::new("Other", true, "X", ""),
            Condition::new("Ready", true, "Converged", "ok"),
        ];
        assert!(set_condition(
            &mut conditions,
            Condition::new("Ready", false, "ReconcileFailed", "boom")
        ));
        assert_eq!(conditions.len(), 2);
        assert!(!is_condition_true(&conditions, "Ready"));
        assert!(is_condition_true(&conditions, "Other"));
    }

    #[test]
    fn test_remove_condition() {
        let mut conditions = vec![Condition::new("Ready", true, "Converged", "ok")];
        assert!(remove_condition(&mut conditions, "Ready"));
        assert!(!remove_condition(&mut conditions, "Ready"));
        assert!(conditions.is_empty());
    }

    #[test]
    fn test_deserializes_minimal_condition() {
        let c: Condition =
            serde_json::from_value(serde_json::json!({"type": "Ready", "status": "True"})).unwrap();
        assert!(c.is_true());
        assert_eq!(c.reason, None);
    }
}

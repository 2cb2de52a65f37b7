// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Condition bookkeeping on untyped status documents

use crate::error::Result;
use crate::types::condition::{remove_condition, set_condition, Condition};
use serde_json::Value;

pub fn conditions_of(status: &Value) -> Result<Vec<Condition>> {
    match status.get("conditions") {
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(raw) => Ok(serde_json::from_value(raw.clone())?),
    }
}

/// Set one condition in `status.conditions`, leaving the others alone
pub fn write_condition(status: &mut Value, condition: Condition) -> Result<()> {
    let mut conditions = conditions_of(status)?;
    if set_condition(&mut conditions, condition) {
        status["conditions"] = serde_json::to_value(conditions)?;
    }
    Ok(())
}

pub fn drop_condition(status: &mut Value, condition_type: &str) -> Result<()> {
    let mut conditions = conditions_of(status)?;
    if remove_condition(&mut conditions, condition_type) {
        status["conditions"] = serde_json::to_value(conditions)?;
    }
    Ok(())
}

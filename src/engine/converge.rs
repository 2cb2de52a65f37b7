// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Create-or-patch convergence against the store.
//!
//! Every write is guarded by the version token read just before it. A
//! conflicting write restarts from a fresh read, a bounded number of times.

use crate::engine::ownership::is_controlled_by;
use crate::error::{ErrorClass, Result, StewardError};
use crate::store::{ObjectKey, Precondition, Store};
use kube::api::DynamicObject;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Unchanged,
    Created,
    Updated,
}

#[derive(Debug, Clone)]
pub struct Converged {
    /// The object as stored after convergence
    pub object: DynamicObject,
    pub operation: Operation,
}

impl Converged {
    pub fn changed(&self) -> bool {
        self.operation != Operation::Unchanged
    }
}

#[derive(Clone)]
pub struct Converger {
    store: Arc<dyn Store>,
    max_attempts: u32,
}

impl Converger {
    pub fn new(store: Arc<dyn Store>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Drive the object at `key` to whatever `mutate` makes of it.
    ///
    /// `mutate` receives the stored object, or an empty object with the key's
    /// identity when nothing is stored yet. It may run once per attempt.
    #[instrument(skip(self, mutate), fields(key = %key))]
    pub async fn create_or_patch<F>(&self, key: &ObjectKey, mut mutate: F) -> Result<Converged>
    where
        F: FnMut(&mut DynamicObject) -> Result<()> + Send,
    {
        for attempt in 1..=self.max_attempts {
            match self.try_create_or_patch(key, &mut mutate).await {
                Ok(converged) => return Ok(converged),
                Err(e) if e.class() == ErrorClass::Conflict => {
                    debug!(attempt, "Conflict, retrying with a fresh read: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        warn!("Giving up after {} conflicting attempts", self.max_attempts);
        Err(StewardError::Transient(format!(
            "{} still conflicting after {} attempts",
            key, self.max_attempts
        )))
    }

    async fn try_create_or_patch<F>(&self, key: &ObjectKey, mutate: &mut F) -> Result<Converged>
    where
        F: FnMut(&mut DynamicObject) -> Result<()> + Send,
    {
        let Some(current) = self.store.get(key).await? else {
            let mut obj = key.empty_object();
            mutate(&mut obj)?;
            check_identity(key, &obj)?;

            let created = self.store.create(&key.kind, &obj).await?;
            info!("Created {}", key);
            return Ok(Converged {
                object: created,
                operation: Operation::Created,
            });
        };

        let mut desired = current.clone();
        mutate(&mut desired)?;
        check_identity(key, &desired)?;

        if semantically_equal(&current, &desired) {
            debug!("{} is up to date", key);
            return Ok(Converged {
                object: current,
                operation: Operation::Unchanged,
            });
        }

        desired.metadata.resource_version = current.metadata.resource_version.clone();
        match self.store.update(&key.kind, &desired).await {
            Ok(updated) => {
                info!("Updated {}", key);
                Ok(Converged {
                    object: updated,
                    operation: Operation::Updated,
                })
            }
            // Deleted between read and write; the next attempt recreates it
            Err(e) if e.class() == ErrorClass::NotFound => Err(StewardError::Conflict(format!(
                "{} disappeared during update",
                key
            ))),
            Err(e) => Err(e),
        }
    }

    /// Delete the object at `key` if it is controlled by `owner_uid`.
    ///
    /// Returns whether a delete was issued. Objects controlled by someone
    /// else are left in place. The delete only applies to the exact object
    /// that was checked; if it changed in between, the check is redone.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn ensure_absent(&self, key: &ObjectKey, owner_uid: &str) -> Result<bool> {
        for attempt in 1..=self.max_attempts {
            match self.try_ensure_absent(key, owner_uid).await {
                Err(e) if e.class() == ErrorClass::Conflict => {
                    debug!(attempt, "{} changed before delete, checking again", key);
                }
                result => return result,
            }
        }

        Err(StewardError::Transient(format!(
            "{} still changing after {} delete attempts",
            key, self.max_attempts
        )))
    }

    async fn try_ensure_absent(&self, key: &ObjectKey, owner_uid: &str) -> Result<bool> {
        let Some(current) = self.store.get(key).await? else {
            return Ok(false);
        };

        if !is_controlled_by(&current, owner_uid) {
            warn!("{} is not controlled by this owner, leaving it in place", key);
            return Ok(false);
        }

        let Some(precondition) = Precondition::observed(&current) else {
            return Err(StewardError::Invalid(format!(
                "{} has no uid or resourceVersion",
                key
            )));
        };

        match self.store.delete_if(key, &precondition).await {
            Ok(()) => {
                info!("Deleted {}", key);
                Ok(true)
            }
            Err(e) if e.class() == ErrorClass::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Apply `mutate` to the status of the object at `key` and write it back
    /// through the status sub-resource when it changed.
    #[instrument(skip(self, mutate), fields(key = %key))]
    pub async fn patch_status<F>(&self, key: &ObjectKey, mut mutate: F) -> Result<bool>
    where
        F: FnMut(&mut Value) -> Result<()> + Send,
    {
        for attempt in 1..=self.max_attempts {
            let current = self
                .store
                .get(key)
                .await?
                .ok_or_else(|| StewardError::NotFound(key.to_string()))?;

            let before = current
                .data
                .get("status")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            let mut status = before.clone();
            mutate(&mut status)?;
            if status == before {
                return Ok(false);
            }

            let mut next = current;
            next.data["status"] = status;
            match self.store.update_status(&key.kind, &next).await {
                Ok(_) => {
                    debug!("Status of {} updated", key);
                    return Ok(true);
                }
                Err(e) if e.class() == ErrorClass::Conflict => {
                    debug!(attempt, "Status conflict, retrying: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(StewardError::Transient(format!(
            "status of {} still conflicting after {} attempts",
            key, self.max_attempts
        )))
    }
}

fn check_identity(key: &ObjectKey, obj: &DynamicObject) -> Result<()> {
    if obj.metadata.name.as_deref() != Some(key.name.as_str())
        || obj.metadata.namespace.as_deref() != Some(key.namespace.as_str())
    {
        return Err(StewardError::Invalid(format!(
            "mutation changed the identity of {}",
            key
        )));
    }
    Ok(())
}

fn without_status(data: &Value) -> Value {
    let mut data = data.clone();
    if let Some(map) = data.as_object_mut() {
        map.remove("status");
    }
    data
}

fn non_empty<V>(map: &Option<BTreeMap<String, V>>) -> Option<&BTreeMap<String, V>> {
    map.as_ref().filter(|m| !m.is_empty())
}

/// Compare the fields the engine manages: body without status, labels,
/// annotations and owner references. Server-managed metadata is ignored.
pub fn semantically_equal(a: &DynamicObject, b: &DynamicObject) -> bool {
    without_status(&a.data) == without_status(&b.data)
        && non_empty(&a.metadata.labels) == non_empty(&b.metadata.labels)
        && non_empty(&a.metadata.annotations) == non_empty(&b.metadata.annotations)
        && a.metadata.owner_references.as_deref().unwrap_or_default()
            == b.metadata.owner_references.as_deref().unwrap_or_default()
}

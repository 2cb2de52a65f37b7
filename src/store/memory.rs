// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-memory store with optimistic concurrency and owner-based cascade delete.
//!
//! Keeps a journal of every write so callers can count them, and can be told
//! to fail upcoming writes with conflicts or unavailability.

use crate::error::{Result, StewardError};
use crate::store::{ChangeType, Kind, ObjectKey, Precondition, Store, WatchEvent};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tracing::debug;

const WATCH_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    UpdateStatus,
    Delete,
    /// Removed by the cascade rule after its owner was deleted
    GarbageCollect,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<ObjectKey, DynamicObject>,
    last_version: u64,
    last_uid: u64,
    journal: Vec<(WriteOp, ObjectKey)>,
    injected_conflicts: HashMap<ObjectKey, u32>,
    injected_unavailable: u32,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }

    fn next_uid(&mut self) -> String {
        self.last_uid += 1;
        format!("uid-{}", self.last_uid)
    }

    fn check_available(&mut self) -> Result<()> {
        if self.injected_unavailable > 0 {
            self.injected_unavailable -= 1;
            return Err(StewardError::Transient("store unavailable".to_string()));
        }
        Ok(())
    }

    fn check_injected_conflict(&mut self, key: &ObjectKey) -> Result<()> {
        if let Some(remaining) = self.injected_conflicts.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StewardError::Conflict(format!("{} was modified", key)));
            }
        }
        Ok(())
    }

    fn check_version(&self, key: &ObjectKey, obj: &DynamicObject) -> Result<DynamicObject> {
        let current = self
            .objects
            .get(key)
            .ok_or_else(|| StewardError::NotFound(key.to_string()))?;
        if obj.metadata.resource_version.is_none()
            || obj.metadata.resource_version != current.metadata.resource_version
        {
            return Err(StewardError::Conflict(format!(
                "{} has version {:?}, update carried {:?}",
                key, current.metadata.resource_version, obj.metadata.resource_version
            )));
        }
        Ok(current.clone())
    }
}

pub struct InMemoryStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
        }
    }

    /// Every write so far, in order
    pub async fn journal(&self) -> Vec<(WriteOp, ObjectKey)> {
        self.inner.lock().await.journal.clone()
    }

    /// Number of writes issued against one key
    pub async fn writes_to(&self, key: &ObjectKey) -> usize {
        self.inner
            .lock()
            .await
            .journal
            .iter()
            .filter(|(op, k)| k == key && *op != WriteOp::GarbageCollect)
            .count()
    }

    pub async fn clear_journal(&self) {
        self.inner.lock().await.journal.clear();
    }

    /// Fail the next `count` updates of `key` with a version conflict
    pub async fn inject_conflicts(&self, key: &ObjectKey, count: u32) {
        self.inner
            .lock()
            .await
            .injected_conflicts
            .insert(key.clone(), count);
    }

    /// Fail the next `count` operations of any kind as unavailable
    pub async fn inject_unavailable(&self, count: u32) {
        self.inner.lock().await.injected_unavailable = count;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove `key` and, transitively, everything it owns
    fn remove_cascading(&self, inner: &mut Inner, key: &ObjectKey) {
        let mut pending = vec![(key.clone(), WriteOp::Delete)];
        while let Some((next, op)) = pending.pop() {
            let Some(removed) = inner.objects.remove(&next) else {
                continue;
            };
            inner.journal.push((op, next.clone()));
            debug!("Deleted {}", next);
            self.publish(&next.kind, &removed, ChangeType::Deleted);

            if let Some(uid) = removed.uid() {
                pending.extend(
                    inner
                        .objects
                        .iter()
                        .filter(|(_, o)| o.owner_references().iter().any(|r| r.uid == uid))
                        .map(|(k, _)| (k.clone(), WriteOp::GarbageCollect)),
                );
            }
        }
    }

    fn publish(&self, kind: &Kind, obj: &DynamicObject, change: ChangeType) {
        if let Some(event) = WatchEvent::from_object(kind, obj, change) {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }
}

fn status_of(obj: &DynamicObject) -> Option<Value> {
    obj.data.get("status").cloned()
}

fn set_status(obj: &mut DynamicObject, status: Option<Value>) {
    match status {
        Some(status) => obj.data["status"] = status,
        None => {
            if let Some(map) = obj.data.as_object_mut() {
                map.remove("status");
            }
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        Ok(inner.objects.get(key).cloned())
    }

    async fn list(&self, kind: &Kind, namespace: Option<&str>) -> Result<Vec<DynamicObject>> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let mut items: Vec<(ObjectKey, DynamicObject)> = inner
            .objects
            .iter()
            .filter(|(k, _)| &k.kind == kind && namespace.map_or(true, |ns| k.namespace == ns))
            .map(|(k, o)| (k.clone(), o.clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items.into_iter().map(|(_, o)| o).collect())
    }

    async fn create(&self, kind: &Kind, obj: &DynamicObject) -> Result<DynamicObject> {
        let key = ObjectKey::from_object(kind, obj)
            .ok_or_else(|| StewardError::Invalid("object needs a name and namespace".to_string()))?;

        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        if inner.objects.contains_key(&key) {
            return Err(StewardError::Conflict(format!("{} already exists", key)));
        }

        let mut stored = obj.clone();
        stored.metadata.uid = Some(inner.next_uid());
        stored.metadata.resource_version = Some(inner.next_version());
        stored.metadata.generation = Some(1);
        stored.types = Some(kube::api::TypeMeta {
            api_version: kind.api_version(),
            kind: kind.kind.clone(),
        });

        inner.objects.insert(key.clone(), stored.clone());
        inner.journal.push((WriteOp::Create, key.clone()));
        debug!("Created {}", key);
        self.publish(kind, &stored, ChangeType::Applied);
        Ok(stored)
    }

    async fn update(&self, kind: &Kind, obj: &DynamicObject) -> Result<DynamicObject> {
        let key = ObjectKey::from_object(kind, obj)
            .ok_or_else(|| StewardError::Invalid("object needs a name and namespace".to_string()))?;

        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        inner.check_injected_conflict(&key)?;
        let current = inner.check_version(&key, obj)?;

        let mut stored = obj.clone();
        stored.types = current.types.clone();
        stored.metadata.uid = current.metadata.uid.clone();
        stored.metadata.creation_timestamp = current.metadata.creation_timestamp.clone();
        set_status(&mut stored, status_of(&current));
        let spec_changed = stored.data.get("spec") != current.data.get("spec");
        stored.metadata.generation = current
            .metadata
            .generation
            .map(|g| if spec_changed { g + 1 } else { g });
        stored.metadata.resource_version = Some(inner.next_version());

        inner.objects.insert(key.clone(), stored.clone());
        inner.journal.push((WriteOp::Update, key.clone()));
        debug!("Updated {}", key);
        self.publish(kind, &stored, ChangeType::Applied);
        Ok(stored)
    }

    async fn update_status(&self, kind: &Kind, obj: &DynamicObject) -> Result<DynamicObject> {
        let key = ObjectKey::from_object(kind, obj)
            .ok_or_else(|| StewardError::Invalid("object needs a name and namespace".to_string()))?;

        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        inner.check_injected_conflict(&key)?;
        let mut stored = inner.check_version(&key, obj)?;

        set_status(&mut stored, status_of(obj));
        stored.metadata.resource_version = Some(inner.next_version());

        inner.objects.insert(key.clone(), stored.clone());
        inner.journal.push((WriteOp::UpdateStatus, key.clone()));
        debug!("Updated status of {}", key);
        self.publish(kind, &stored, ChangeType::Applied);
        Ok(stored)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        if !inner.objects.contains_key(key) {
            return Err(StewardError::NotFound(key.to_string()));
        }
        self.remove_cascading(&mut inner, key);
        Ok(())
    }

    async fn delete_if(&self, key: &ObjectKey, precondition: &Precondition) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let current = inner
            .objects
            .get(key)
            .ok_or_else(|| StewardError::NotFound(key.to_string()))?;
        if Precondition::observed(current).as_ref() != Some(precondition) {
            return Err(StewardError::Conflict(format!(
                "{} changed since it was read",
                key
            )));
        }
        self.remove_cascading(&mut inner, key);
        Ok(())
    }

    fn watch(&self, kind: &Kind) -> BoxStream<'static, Result<WatchEvent>> {
        let kind = kind.clone();
        stream::unfold(self.events.subscribe(), |mut rx| async move {
            match rx.recv().await {
                Ok(event) => Some((Ok(event), rx)),
                Err(RecvError::Lagged(missed)) => Some((
                    Err(StewardError::WatchError(format!(
                        "watch fell behind by {} events",
                        missed
                    ))),
                    rx,
                )),
                Err(RecvError::Closed) => None,
            }
        })
        .filter(move |item| {
            futures::future::ready(match item {
                Ok(event) => event.key.kind == kind,
                Err(_) => true,
            })
        })
        .boxed()
    }
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Versioned object store the engine reconciles against.
//!
//! Objects travel as [`DynamicObject`]s. The optimistic-concurrency token is
//! `metadata.resourceVersion`: an update must carry the token last observed
//! and a mismatch is rejected with a conflict.

pub mod apiserver;
pub mod memory;

pub use apiserver::KubeStore;
pub use memory::{InMemoryStore, WriteOp};

use crate::error::{Result, StewardError};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Resource, ResourceExt};
use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Group, version, kind and plural of a resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Kind {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl Kind {
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Kind {
            group: K::group(&()).to_string(),
            version: K::version(&()).to_string(),
            kind: K::kind(&()).to_string(),
            plural: K::plural(&()).to_string(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(&self.group, &self.version, &self.kind),
            &self.plural,
        )
    }

    /// Whether an owner reference points at an object of this kind
    pub fn matches(&self, owner: &OwnerReference) -> bool {
        owner.kind == self.kind && owner.api_version == self.api_version()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.group)
    }
}

/// Namespace-qualified identity of one object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectKey {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a stored object, if it carries a name and namespace
    pub fn from_object(kind: &Kind, obj: &DynamicObject) -> Option<Self> {
        Some(ObjectKey::new(
            kind.clone(),
            obj.metadata.namespace.clone()?,
            obj.metadata.name.clone()?,
        ))
    }

    /// An empty object carrying this identity
    pub fn empty_object(&self) -> DynamicObject {
        DynamicObject::new(&self.name, &self.kind.api_resource()).within(&self.namespace)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Created or updated
    Applied,
    Deleted,
}

/// One change notification from [`Store::watch`]
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub key: ObjectKey,
    pub change: ChangeType,
    pub uid: Option<String>,
    /// `metadata.generation`; unchanged by status-only writes
    pub generation: Option<i64>,
    pub owner_references: Vec<OwnerReference>,
}

impl WatchEvent {
    pub fn from_object(kind: &Kind, obj: &DynamicObject, change: ChangeType) -> Option<Self> {
        Some(WatchEvent {
            key: ObjectKey::from_object(kind, obj)?,
            change,
            uid: obj.metadata.uid.clone(),
            generation: obj.metadata.generation,
            owner_references: obj.owner_references().to_vec(),
        })
    }
}

/// What a delete must still find: the object observed before deciding to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub uid: String,
    pub resource_version: String,
}

impl Precondition {
    /// `None` for objects that were never stored
    pub fn observed(obj: &DynamicObject) -> Option<Self> {
        Some(Precondition {
            uid: obj.metadata.uid.clone()?,
            resource_version: obj.metadata.resource_version.clone()?,
        })
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one object; `None` when it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>>;

    /// List objects of a kind, optionally restricted to one namespace
    async fn list(&self, kind: &Kind, namespace: Option<&str>) -> Result<Vec<DynamicObject>>;

    /// Create a new object. An existing object with the same key is a conflict.
    async fn create(&self, kind: &Kind, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Replace spec and metadata, guarded by `obj.metadata.resource_version`
    async fn update(&self, kind: &Kind, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Replace the status only, guarded by `obj.metadata.resource_version`
    async fn update_status(&self, kind: &Kind, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Delete one object; owned objects are reclaimed by the store
    async fn delete(&self, key: &ObjectKey) -> Result<()>;

    /// Delete one object only if it still matches `precondition`; a mismatch
    /// is a conflict
    async fn delete_if(&self, key: &ObjectKey, precondition: &Precondition) -> Result<()>;

    /// Stream of changes to objects of a kind
    fn watch(&self, kind: &Kind) -> BoxStream<'static, Result<WatchEvent>>;
}

/// Convert a dynamic object into its typed form
pub fn to_typed<K>(obj: &DynamicObject) -> Result<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let value = serde_json::to_value(obj)?;
    serde_json::from_value(value).map_err(|e| {
        StewardError::Invalid(format!(
            "{} {} does not parse: {}",
            K::kind(&()),
            obj.name_any(),
            e
        ))
    })
}

/// Convert a typed object into a dynamic object
pub fn to_dynamic<K>(obj: &K) -> Result<DynamicObject>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let mut dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
    if dynamic.types.is_none() {
        dynamic.types = Some(kube::api::TypeMeta {
            api_version: K::api_version(&()).to_string(),
            kind: K::kind(&()).to_string(),
        });
    }
    Ok(dynamic)
}

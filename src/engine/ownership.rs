// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Controller owner references.
//!
//! The owner reference is a plain back-pointer on the child. Cascade deletion
//! is done by the store; nothing here deletes anything.

use crate::error::{Result, StewardError};
use crate::store::{Kind, ObjectKey, WatchEvent};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};

/// The controller owner reference of an object, if any
pub fn controller_of<K: Resource>(obj: &K) -> Option<&OwnerReference> {
    obj.meta()
        .owner_references
        .as_deref()
        .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)))
}

pub fn is_controlled_by<K: Resource>(obj: &K, owner_uid: &str) -> bool {
    controller_of(obj).is_some_and(|r| r.uid == owner_uid)
}

/// Stamp `owner` as the controller of `child`.
///
/// Re-stamping the same owner is a no-op. A child already controlled by a
/// different object is rejected rather than taken over.
pub fn set_controller_reference<O>(child: &mut DynamicObject, owner: &O) -> Result<()>
where
    O: Resource<DynamicType = ()>,
{
    let mut owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        StewardError::Invalid(format!(
            "{} {} has no uid yet and cannot own anything",
            O::kind(&()),
            owner.name_any()
        ))
    })?;
    owner_ref.block_owner_deletion = Some(true);

    if let Some(existing) = controller_of(child) {
        if existing.uid != owner_ref.uid {
            return Err(StewardError::AlreadyOwned {
                child: child.name_any(),
                kind: existing.kind.clone(),
                name: existing.name.clone(),
            });
        }
    }

    let refs = child.owner_references_mut();
    match refs.iter_mut().find(|r| r.uid == owner_ref.uid) {
        Some(existing) => *existing = owner_ref,
        None => refs.push(owner_ref),
    }
    Ok(())
}

/// Key of the parent of `parent_kind` that controls the object in `event`
pub fn owner_key(event: &WatchEvent, parent_kind: &Kind) -> Option<ObjectKey> {
    event
        .owner_references
        .iter()
        .find(|r| r.controller == Some(true) && parent_kind.matches(r))
        .map(|r| ObjectKey::new(parent_kind.clone(), event.key.namespace.clone(), r.name.clone()))
}

/// Whether a watch event concerns an object controlled by `parent`
pub fn filter_owned_by(event: &WatchEvent, parent: &ObjectKey) -> bool {
    owner_key(event, &parent.kind).as_ref() == Some(parent)
}

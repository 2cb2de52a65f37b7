// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Desired state of each child, derived from the control plane spec alone.

use crate::constants::children::{KEYSTONE_NAME, MARIADB_NAME};
use crate::store::Kind;
use crate::types::{KeystoneAPI, KeystoneAPISpec, MariaDB, MariaDBSpec, OpenStackControlPlaneSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    MariaDb,
    KeystoneApi,
}

/// Keystone keeps its database in MariaDB, so MariaDB goes first
pub const CHILD_ORDER: [ChildKind; 2] = [ChildKind::MariaDb, ChildKind::KeystoneApi];

impl ChildKind {
    pub fn kind(self) -> Kind {
        match self {
            ChildKind::MariaDb => Kind::of::<MariaDB>(),
            ChildKind::KeystoneApi => Kind::of::<KeystoneAPI>(),
        }
    }

    /// Children have fixed names; other services look them up by name
    pub fn fixed_name(self) -> &'static str {
        match self {
            ChildKind::MariaDb => MARIADB_NAME,
            ChildKind::KeystoneApi => KEYSTONE_NAME,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChildSpec {
    MariaDb(MariaDBSpec),
    KeystoneApi(KeystoneAPISpec),
}

impl ChildSpec {
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            ChildSpec::MariaDb(spec) => serde_json::to_value(spec),
            ChildSpec::KeystoneApi(spec) => serde_json::to_value(spec),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DesiredChild {
    Present { name: String, spec: ChildSpec },
    Absent { name: String },
}

impl DesiredChild {
    pub fn name(&self) -> &str {
        match self {
            DesiredChild::Present { name, .. } | DesiredChild::Absent { name } => name,
        }
    }
}

pub fn resolve(spec: &OpenStackControlPlaneSpec, child: ChildKind) -> DesiredChild {
    let name = child.fixed_name().to_string();
    let enabled = match child {
        ChildKind::MariaDb => spec.mariadb.enabled,
        ChildKind::KeystoneApi => spec.keystone.enabled,
    };
    if !enabled {
        return DesiredChild::Absent { name };
    }

    let spec = match child {
        ChildKind::MariaDb => ChildSpec::MariaDb(resolve_mariadb(spec)),
        ChildKind::KeystoneApi => ChildSpec::KeystoneApi(resolve_keystone(spec)),
    };
    DesiredChild::Present { name, spec }
}

pub fn resolve_mariadb(spec: &OpenStackControlPlaneSpec) -> MariaDBSpec {
    let mut db = spec.mariadb.template.clone();
    if db.secret.is_empty() {
        db.secret = spec.secret.clone();
    }
    if db.storage_class.is_empty() {
        db.storage_class = spec.effective_storage_class().to_string();
    }
    db
}

pub fn resolve_keystone(spec: &OpenStackControlPlaneSpec) -> KeystoneAPISpec {
    let mut keystone = spec.keystone.template.clone();
    if keystone.secret.is_empty() {
        keystone.secret = spec.secret.clone();
    }
    if keystone.database_instance.is_empty() {
        keystone.database_instance = MARIADB_NAME.to_string();
    }
    keystone
}

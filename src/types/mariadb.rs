// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::condition::{is_condition_true, Condition};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "mariadb.openstack.org", version = "v1beta1", kind = "MariaDB")]
#[kube(namespaced)]
#[kube(status = "MariaDBStatus")]
#[serde(rename_all = "camelCase")]
pub struct MariaDBSpec {
    #[serde(default)]
    pub container_image: String,
    /// Name of the secret holding the root password
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub storage_class: String,
    #[serde(default)]
    pub storage_request: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MariaDBStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

impl MariaDB {
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.as_deref())
            .is_some_and(|c| is_condition_true(c, "Ready"))
    }
}

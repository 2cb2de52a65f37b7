// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::condition::{is_condition_true, Condition};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(group = "keystone.openstack.org", version = "v1beta1", kind = "KeystoneAPI")]
#[kube(namespaced)]
#[kube(status = "KeystoneAPIStatus")]
#[serde(rename_all = "camelCase")]
pub struct KeystoneAPISpec {
    #[serde(default)]
    pub container_image: String,
    #[serde(default)]
    pub secret: String,
    /// Name of the MariaDB instance holding the keystone database
    #[serde(default)]
    pub database_instance: String,
    #[serde(default)]
    pub database_user: String,
    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

fn default_replicas() -> i32 {
    1
}

impl Default for KeystoneAPISpec {
    fn default() -> Self {
        KeystoneAPISpec {
            container_image: String::new(),
            secret: String::new(),
            database_instance: String::new(),
            database_user: String::new(),
            replicas: default_replicas(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeystoneAPIStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
}

impl KeystoneAPI {
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.as_deref())
            .is_some_and(|c| is_condition_true(c, "Ready"))
    }
}

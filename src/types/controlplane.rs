// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::DEFAULT_STORAGE_CLASS;
use crate::error::{Result, StewardError};
use crate::types::condition::{is_condition_true, Condition};
use crate::types::keystone::KeystoneAPISpec;
use crate::types::mariadb::MariaDBSpec;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "core.openstack.org",
    version = "v1beta1",
    kind = "OpenStackControlPlane",
    shortname = "osctlplane"
)]
#[kube(namespaced)]
#[kube(status = "OpenStackControlPlaneStatus")]
#[serde(rename_all = "camelCase")]
pub struct OpenStackControlPlaneSpec {
    /// Secret shared by all services unless their template names another
    #[serde(default)]
    pub secret: String,
    /// Storage class for services with persistent storage
    #[serde(default)]
    pub storage_class: String,
    #[serde(default)]
    pub mariadb: MariaDBSection,
    #[serde(default)]
    pub keystone: KeystoneSection,
}

#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MariaDBSection {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub template: MariaDBSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeystoneSection {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub template: KeystoneAPISpec,
}

fn enabled_by_default() -> bool {
    true
}

impl Default for MariaDBSection {
    fn default() -> Self {
        MariaDBSection {
            enabled: true,
            template: MariaDBSpec::default(),
        }
    }
}

impl Default for KeystoneSection {
    fn default() -> Self {
        KeystoneSection {
            enabled: true,
            template: KeystoneAPISpec::default(),
        }
    }
}

impl OpenStackControlPlaneSpec {
    /// Storage class children inherit when their template leaves it empty
    pub fn effective_storage_class(&self) -> &str {
        if self.storage_class.is_empty() {
            DEFAULT_STORAGE_CLASS
        } else {
            &self.storage_class
        }
    }

    /// Reject specs the resolver cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.keystone.template.replicas < 0 {
            return Err(StewardError::Invalid(format!(
                "spec.keystone.template.replicas must not be negative, got {}",
                self.keystone.template.replicas
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackControlPlaneStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl OpenStackControlPlane {
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| is_condition_true(&s.conditions, "Ready"))
    }

    /// "namespace/name", for logs
    pub fn identity(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn make_control_plane(spec: OpenStackControlPlaneSpec) -> OpenStackControlPlane {
        OpenStackControlPlane {
            metadata: ObjectMeta {
                name: Some("overcloud".to_string()),
                namespace: Some("openstack".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    #[test]
    fn test_effective_storage_class_defaults_to_standard() {
        let spec = OpenStackControlPlaneSpec::default();
        assert_eq!(spec.effective_storage_class(), "standard");
    }

    #[test]
    fn test_effective_storage_class_from_spec() {
        let spec = OpenStackControlPlaneSpec {
            storage_class: "fast".to_string(),
            ..Default::default()
        };
        assert_eq!(spec.effective_storage_class(), "fast");
    }

    #[test]
    fn test_validate_accepts_empty_secret() {
        assert!(OpenStackControlPlaneSpec::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_negative_replicas() {
        let mut spec = OpenStackControlPlaneSpec::default();
        spec.keystone.template.replicas = -1;
        assert!(matches!(spec.validate(), Err(StewardError::Invalid(_))));
    }

    #[test]
    fn test_sections_enabled_when_omitted() {
        let spec: OpenStackControlPlaneSpec =
            serde_json::from_value(serde_json::json!({"secret": "s", "mariadb": {}})).unwrap();
        assert!(spec.mariadb.enabled);
        assert!(spec.keystone.enabled);
        assert_eq!(spec.keystone.template.replicas, 1);
    }

    #[test]
    fn test_is_ready_without_status() {
        let cp = make_control_plane(OpenStackControlPlaneSpec::default());
        assert!(!cp.is_ready());
        assert_eq!(cp.identity(), "openstack/overcloud");
    }

    #[test]
    fn test_is_ready_with_ready_condition() {
        let mut cp = make_control_plane(OpenStackControlPlaneSpec::default());
        cp.status = Some(OpenStackControlPlaneStatus {
            conditions: vec![Condition::new("Ready", true, "Converged", "")],
            observed_generation: Some(1),
        });
        assert!(cp.is_ready());
    }
}

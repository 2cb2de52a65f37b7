// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Store backed by a Kubernetes API server

use crate::constants::OPERATOR_NAME;
use crate::error::{ErrorClass, Result, StewardError};
use crate::store::{ChangeType, Kind, ObjectKey, Precondition, Store, WatchEvent};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use kube::{
    api::{DeleteParams, DynamicObject, ListParams, PostParams, Preconditions},
    Api, Client, ResourceExt,
};
use kube_runtime::{watcher, WatchStreamExt};
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    /// Restricts list and watch to one namespace when set
    namespace: Option<String>,
}

impl KubeStore {
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn namespaced(&self, kind: &Kind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }

    async fn delete_with(&self, key: &ObjectKey, params: &DeleteParams) -> Result<()> {
        match self
            .namespaced(&key.kind, &key.namespace)
            .delete(&key.name, params)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = StewardError::from(e);
                if err.class() == ErrorClass::NotFound {
                    Err(StewardError::NotFound(key.to_string()))
                } else {
                    Err(err)
                }
            }
        }
    }

    fn scoped(&self, kind: &Kind, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace.or(self.namespace.as_deref()) {
            Some(ns) => self.namespaced(kind, ns),
            None => Api::all_with(self.client.clone(), &kind.api_resource()),
        }
    }

    fn write_params() -> PostParams {
        PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        }
    }
}

fn identity(kind: &Kind, obj: &DynamicObject) -> Result<(String, String)> {
    match (obj.namespace(), obj.metadata.name.clone()) {
        (Some(ns), Some(name)) => Ok((ns, name)),
        _ => Err(StewardError::Invalid(format!(
            "{} object needs a name and namespace",
            kind.kind
        ))),
    }
}

#[async_trait]
impl Store for KubeStore {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>> {
        Ok(self
            .namespaced(&key.kind, &key.namespace)
            .get_opt(&key.name)
            .await?)
    }

    async fn list(&self, kind: &Kind, namespace: Option<&str>) -> Result<Vec<DynamicObject>> {
        let list = self
            .scoped(kind, namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    #[instrument(skip(self, obj), fields(kind = %kind.kind, name = %obj.name_any()))]
    async fn create(&self, kind: &Kind, obj: &DynamicObject) -> Result<DynamicObject> {
        let (ns, _) = identity(kind, obj)?;
        debug!("Creating object");
        Ok(self
            .namespaced(kind, &ns)
            .create(&Self::write_params(), obj)
            .await?)
    }

    #[instrument(skip(self, obj), fields(kind = %kind.kind, name = %obj.name_any()))]
    async fn update(&self, kind: &Kind, obj: &DynamicObject) -> Result<DynamicObject> {
        let (ns, name) = identity(kind, obj)?;
        debug!("Replacing object at version {:?}", obj.resource_version());
        Ok(self
            .namespaced(kind, &ns)
            .replace(&name, &Self::write_params(), obj)
            .await?)
    }

    #[instrument(skip(self, obj), fields(kind = %kind.kind, name = %obj.name_any()))]
    async fn update_status(&self, kind: &Kind, obj: &DynamicObject) -> Result<DynamicObject> {
        let (ns, name) = identity(kind, obj)?;
        let body = serde_json::to_vec(obj)?;
        Ok(self
            .namespaced(kind, &ns)
            .replace_status(&name, &Self::write_params(), body)
            .await?)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        // Background propagation leaves owned objects to the garbage collector
        self.delete_with(key, &DeleteParams::background()).await
    }

    #[instrument(skip(self, precondition), fields(key = %key))]
    async fn delete_if(&self, key: &ObjectKey, precondition: &Precondition) -> Result<()> {
        let params = DeleteParams::background().preconditions(Preconditions {
            uid: Some(precondition.uid.clone()),
            resource_version: Some(precondition.resource_version.clone()),
        });
        self.delete_with(key, &params).await
    }

    fn watch(&self, kind: &Kind) -> BoxStream<'static, Result<WatchEvent>> {
        let api = self.scoped(kind, None);
        let kind = kind.clone();

        watcher(api, watcher::Config::default())
            .default_backoff()
            .filter_map(move |event| {
                let mapped = match event {
                    Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => {
                        WatchEvent::from_object(&kind, &obj, ChangeType::Applied).map(Ok)
                    }
                    Ok(watcher::Event::Delete(obj)) => {
                        WatchEvent::from_object(&kind, &obj, ChangeType::Deleted).map(Ok)
                    }
                    Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                    Err(e) => Some(Err(StewardError::WatchError(e.to_string()))),
                };
                futures::future::ready(mapped)
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mariadb_json, not_found_json, MockService};
    use crate::types::MariaDB;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(Kind::of::<MariaDB>(), "openstack", name)
    }

    const DB_PATH: &str = "/apis/mariadb.openstack.org/v1beta1/namespaces/openstack/mariadbs";

    #[tokio::test]
    async fn test_get_existing_object() {
        let client = MockService::new()
            .on_get(
                &format!("{}/openstack", DB_PATH),
                200,
                &mariadb_json("openstack", "fast", "42"),
            )
            .into_client();
        let store = KubeStore::new(client, None);

        let obj = store.get(&key("openstack")).await.unwrap().unwrap();
        assert_eq!(obj.resource_version().as_deref(), Some("42"));
        assert_eq!(obj.data["spec"]["storageClass"], "fast");
    }

    #[tokio::test]
    async fn test_get_missing_object_is_none() {
        let client = MockService::new()
            .on_get(
                &format!("{}/openstack", DB_PATH),
                404,
                &not_found_json("mariadbs", "openstack"),
            )
            .into_client();
        let store = KubeStore::new(client, None);

        assert!(store.get(&key("openstack")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_conflict_is_classified() {
        let conflict = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": "the object has been modified",
            "reason": "Conflict",
            "code": 409
        })
        .to_string();
        let client = MockService::new()
            .on_put(&format!("{}/openstack", DB_PATH), 409, &conflict)
            .into_client();
        let store = KubeStore::new(client, None);

        let mut obj = key("openstack").empty_object();
        obj.metadata.resource_version = Some("41".to_string());
        let err = store.update(&Kind::of::<MariaDB>(), &obj).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    #[tokio::test]
    async fn test_create_posts_to_collection() {
        let client = MockService::new()
            .on_post(DB_PATH, 201, &mariadb_json("openstack", "standard", "1"))
            .into_client();
        let store = KubeStore::new(client, None);

        let created = store
            .create(&Kind::of::<MariaDB>(), &key("openstack").empty_object())
            .await
            .unwrap();
        assert_eq!(created.data["spec"]["storageClass"], "standard");
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let client = MockService::new().into_client();
        let store = KubeStore::new(client, None);

        let err = store.delete(&key("openstack")).await.unwrap_err();
        assert!(matches!(err, StewardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_if_sends_uid_and_version_preconditions() {
        let mock = MockService::new().on_delete(
            &format!("{}/openstack", DB_PATH),
            200,
            &mariadb_json("openstack", "fast", "42"),
        );
        let store = KubeStore::new(mock.clone().into_client(), None);

        let precondition = Precondition {
            uid: "test-uid".to_string(),
            resource_version: "42".to_string(),
        };
        store.delete_if(&key("openstack"), &precondition).await.unwrap();

        let sent = mock.last_body("DELETE").unwrap();
        assert_eq!(sent["preconditions"]["uid"], "test-uid");
        assert_eq!(sent["preconditions"]["resourceVersion"], "42");
        assert_eq!(sent["propagationPolicy"], "Background");
    }

    #[tokio::test]
    async fn test_delete_if_on_changed_object_is_conflict() {
        let conflict = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": "Precondition failed: UID in precondition: test-uid, UID in object meta: other",
            "reason": "Conflict",
            "code": 409
        })
        .to_string();
        let client = MockService::new()
            .on_delete(&format!("{}/openstack", DB_PATH), 409, &conflict)
            .into_client();
        let store = KubeStore::new(client, None);

        let precondition = Precondition {
            uid: "test-uid".to_string(),
            resource_version: "42".to_string(),
        };
        let err = store.delete_if(&key("openstack"), &precondition).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    #[tokio::test]
    async fn test_create_without_namespace_is_invalid() {
        let client = MockService::new().into_client();
        let store = KubeStore::new(client, None);
        let obj = DynamicObject::new("openstack", &Kind::of::<MariaDB>().api_resource());

        let err = store.create(&Kind::of::<MariaDB>(), &obj).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Invalid);
    }
}

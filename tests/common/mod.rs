// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
#![allow(dead_code)]

use kube::api::{DynamicObject, ObjectMeta};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use steward::config::Config;
use steward::store::{to_dynamic, InMemoryStore, Kind, ObjectKey, Store};
use steward::types::{KeystoneAPI, MariaDB, OpenStackControlPlane, OpenStackControlPlaneSpec};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const NAMESPACE: &str = "openstack";

pub fn test_config() -> Config {
    Config {
        workers: 4,
        resync_interval: Duration::from_secs(3600),
        backoff_base: Duration::from_millis(5),
        backoff_max: Duration::from_millis(200),
        shutdown_grace: Duration::from_secs(1),
        ..Default::default()
    }
}

pub fn controlplane_key(name: &str) -> ObjectKey {
    ObjectKey::new(Kind::of::<OpenStackControlPlane>(), NAMESPACE, name)
}

pub fn mariadb_key() -> ObjectKey {
    ObjectKey::new(Kind::of::<MariaDB>(), NAMESPACE, "openstack")
}

pub fn keystone_key() -> ObjectKey {
    ObjectKey::new(Kind::of::<KeystoneAPI>(), NAMESPACE, "keystone")
}

pub fn controlplane_spec(storage_class: &str) -> OpenStackControlPlaneSpec {
    OpenStackControlPlaneSpec {
        secret: "osp-secret".to_string(),
        storage_class: storage_class.to_string(),
        ..Default::default()
    }
}

pub async fn create_controlplane(
    store: &InMemoryStore,
    name: &str,
    spec: OpenStackControlPlaneSpec,
) -> DynamicObject {
    let controlplane = OpenStackControlPlane {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec,
        status: None,
    };
    let obj = to_dynamic(&controlplane).expect("control plane converts");
    store
        .create(&Kind::of::<OpenStackControlPlane>(), &obj)
        .await
        .expect("control plane created")
}

/// Replace the spec of a stored object
pub async fn edit_spec(store: &InMemoryStore, key: &ObjectKey, edit: impl FnOnce(&mut serde_json::Value)) {
    let mut obj = store.get(key).await.unwrap().expect("object exists");
    edit(&mut obj.data["spec"]);
    store.update(&key.kind, &obj).await.expect("spec updated");
}

/// Poll `check` until it holds or `timeout` passes
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A running controller and the means to stop it
pub struct Running {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Running {
    pub fn spawn<F>(run: impl FnOnce(std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) -> F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(run(Box::pin(async move {
            let _ = stopped.await;
        })));
        Running {
            stop: Some(stop),
            handle,
        }
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("controller stops in time")
            .expect("controller task did not panic");
        result.expect("controller ran cleanly");
    }
}

pub fn shared(store: &Arc<InMemoryStore>) -> Arc<dyn Store> {
    store.clone()
}

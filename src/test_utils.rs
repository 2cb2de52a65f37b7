// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Canned API server responses and fixtures for store tests.

use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

type Route = (String, String);

/// Canned API server: answers by exact method and path, remembers what was sent
#[derive(Clone, Default)]
pub struct MockService {
    routes: Arc<Mutex<HashMap<Route, (u16, String)>>>,
    received: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.route("GET", path, status, body)
    }

    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.route("POST", path, status, body)
    }

    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.route("PUT", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.route("DELETE", path, status, body)
    }

    pub fn into_client(self) -> Client {
        Client::new(self, "https://kubernetes.default.svc")
    }

    /// JSON body of the most recent request with `method`
    pub fn last_body(&self, method: &str) -> Option<Value> {
        let received = self.received.lock().unwrap();
        let (_, _, body) = received.iter().rev().find(|(m, _, _)| m == method)?;
        serde_json::from_slice(body).ok()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(&(method.clone(), path.clone()))
            .cloned()
            .unwrap_or_else(|| (404, not_found_json("path", &path)));
        let received = self.received.clone();

        Box::pin(async move {
            let body = req.into_body().collect_bytes().await?;
            received.lock().unwrap().push((method, path, body.to_vec()));

            let (status, body) = reply;
            let response = Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))?;
            Ok::<_, tower::BoxError>(response)
        })
    }
}

/// Create a mock MariaDB JSON response
pub fn mariadb_json(name: &str, storage_class: &str, resource_version: &str) -> String {
    serde_json::json!({
        "apiVersion": "mariadb.openstack.org/v1beta1",
        "kind": "MariaDB",
        "metadata": {
            "name": name,
            "namespace": "openstack",
            "uid": "test-uid",
            "resourceVersion": resource_version
        },
        "spec": {
            "secret": "osp-secret",
            "storageClass": storage_class
        }
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

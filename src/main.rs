// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use steward::config::Config;
use steward::kubernetes::wait_for_crds;
use steward::reconcilers::{ControlPlaneReconciler, CHILD_ORDER};
use steward::store::KubeStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Steward operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: namespace={}, workers={}, resync={:?}",
        config.watch_namespace.as_deref().unwrap_or("<all>"),
        config.workers,
        config.resync_interval
    );

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    // Wait for the control plane and child CRDs before starting the controller
    let mut kinds = vec![ControlPlaneReconciler::parent_kind()];
    kinds.extend(CHILD_ORDER.iter().map(|child| child.kind()));
    info!("Waiting for CRDs to become available...");
    wait_for_crds(&client, &kinds).await?;

    let store = Arc::new(KubeStore::new(client, config.watch_namespace.clone()));
    let reconciler = ControlPlaneReconciler::new(store, config);

    info!("Starting reconciler...");
    reconciler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Steward operator stopped");
    Ok(())
}

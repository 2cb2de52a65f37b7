// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use crate::store::Kind;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Wait until every kind in `kinds` is served by the API server.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_crds(client: &Client, kinds: &[Kind]) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match missing_kinds(client, kinds).await {
            Ok(missing) if missing.is_empty() => {
                info!("All {} CRDs are available", kinds.len());
                return Ok(());
            }
            Ok(missing) => {
                let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
                info!(
                    "CRDs not yet available: {}, waiting {} seconds...",
                    names.join(", "),
                    interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for CRDs: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        // Exponential backoff with max cap
        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

/// The kinds from `kinds` that discovery does not report yet
async fn missing_kinds<'a>(client: &Client, kinds: &'a [Kind]) -> Result<Vec<&'a Kind>> {
    let groups: Vec<&str> = kinds.iter().map(|k| k.group.as_str()).collect();
    let discovery = Discovery::new(client.clone()).filter(&groups).run().await?;

    let served = |kind: &Kind| {
        discovery.groups().any(|group| {
            group.name() == kind.group
                && group
                    .versioned_resources(&kind.version)
                    .iter()
                    .any(|(ar, _)| ar.kind == kind.kind)
        })
    };

    Ok(kinds.iter().filter(|k| !served(*k)).collect())
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Print the CustomResourceDefinitions served by the operator as YAML.

use anyhow::{Context, Result};
use kube::CustomResourceExt;
use steward::types::{KeystoneAPI, MariaDB, OpenStackControlPlane};

fn main() -> Result<()> {
    let crds = [OpenStackControlPlane::crd(), MariaDB::crd(), KeystoneAPI::crd()];
    for crd in &crds {
        let yaml = serde_yaml::to_string(crd).context("Failed to serialize CRD")?;
        println!("---\n{}", yaml);
    }
    Ok(())
}

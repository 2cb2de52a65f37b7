// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types for the control plane and its children.

pub mod condition;
pub mod controlplane;
pub mod keystone;
pub mod mariadb;

pub use condition::Condition;
pub use controlplane::{OpenStackControlPlane, OpenStackControlPlaneSpec, OpenStackControlPlaneStatus};
pub use keystone::{KeystoneAPI, KeystoneAPISpec};
pub use mariadb::{MariaDB, MariaDBSpec};

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcilers that turn a parent resource into its children.

pub mod controlplane;
pub mod resolver;

pub use controlplane::ControlPlaneReconciler;
pub use resolver::{resolve, ChildKind, ChildSpec, DesiredChild, CHILD_ORDER};

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Work queue and the controller loop draining it.

pub mod controller;
pub mod queue;

pub use controller::{default_error_policy, Controller, ControllerConfig, Outcome};
pub use queue::{KeyState, WorkQueue};

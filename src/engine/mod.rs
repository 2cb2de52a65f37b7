// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Convergence primitives: create-or-patch, ownership and status writes.

pub mod converge;
pub mod ownership;
pub mod status;

pub use converge::{Converged, Converger, Operation};
pub use ownership::{controller_of, filter_owned_by, is_controlled_by, owner_key, set_controller_reference};

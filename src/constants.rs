// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The operator name used as field manager on writes
pub const OPERATOR_NAME: &str = "steward";

/// Fixed names of the child resources owned by a control plane.
///
/// KeystoneAPI only works when named "keystone", and KeystoneAPI locates its
/// database by the MariaDB name, so neither may be derived from the parent.
pub mod children {
    pub const MARIADB_NAME: &str = "openstack";
    pub const KEYSTONE_NAME: &str = "keystone";
}

/// Storage class used when neither the child template nor the parent sets one
pub const DEFAULT_STORAGE_CLASS: &str = "standard";

/// Status condition types and reasons written by the operator
pub mod conditions {
    pub const READY: &str = "Ready";
    pub const MARIADB_READY: &str = "MariaDBReady";
    pub const KEYSTONE_READY: &str = "KeystoneAPIReady";

    pub const REASON_CONVERGED: &str = "Converged";
    pub const REASON_WAITING: &str = "WaitingForChildren";
    pub const REASON_CHILD_READY: &str = "ChildReady";
    pub const REASON_CHILD_NOT_READY: &str = "ChildNotReady";
    pub const REASON_FAILED: &str = "ReconcileFailed";
}

/// Reconcile loop defaults
pub mod runtime {
    pub const DEFAULT_WORKERS: usize = 4;
    pub const DEFAULT_RESYNC_SECS: u64 = 300;
    pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;
    pub const DEFAULT_BACKOFF_BASE_MILLIS: u64 = 5;
    pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;
    pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
    /// Delay before checking again on children that are not ready yet
    pub const NOT_READY_REQUEUE_SECS: u64 = 10;
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

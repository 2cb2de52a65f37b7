// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! OpenStackControlPlane reconciler - keeps MariaDB and KeystoneAPI children
//! in line with the control plane spec and reports their readiness.

use crate::config::Config;
use crate::constants::conditions::{
    KEYSTONE_READY, MARIADB_READY, READY, REASON_CHILD_NOT_READY, REASON_CHILD_READY,
    REASON_CONVERGED, REASON_WAITING,
};
use crate::constants::runtime::NOT_READY_REQUEUE_SECS;
use crate::engine::converge::Converger;
use crate::engine::ownership::set_controller_reference;
use crate::engine::status::{drop_condition, write_condition};
use crate::error::{Result, StewardError};
use crate::reconcilers::resolver::{resolve, ChildKind, DesiredChild, CHILD_ORDER};
use crate::runtime::{default_error_policy, Controller, ControllerConfig, Outcome};
use crate::store::{to_typed, Kind, ObjectKey, Store};
use crate::types::condition::Condition;
use crate::types::{KeystoneAPI, MariaDB, OpenStackControlPlane};
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub struct ControlPlaneReconciler {
    converger: Converger,
    store: Arc<dyn Store>,
    config: Config,
}

/// Readiness of one child after convergence
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChildReport {
    child: ChildKind,
    /// `None` when the child is disabled
    ready: Option<bool>,
}

impl ControlPlaneReconciler {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            converger: Converger::new(store.clone(), config.max_conflict_retries),
            store,
            config,
        }
    }

    pub fn parent_kind() -> Kind {
        Kind::of::<OpenStackControlPlane>()
    }

    /// The controller watching control planes and every child kind
    pub fn controller(&self) -> Controller {
        CHILD_ORDER.iter().fold(
            Controller::new(
                self.store.clone(),
                Self::parent_kind(),
                ControllerConfig::from(&self.config),
            ),
            |controller, child| controller.owns(child.kind()),
        )
    }

    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) -> anyhow::Result<()> {
        let controller = self.controller();
        controller
            .run(reconcile, error_policy, Arc::new(self), shutdown)
            .await
    }
}

#[instrument(skip(obj, ctx), fields(controlplane = %obj.name_any()))]
pub async fn reconcile(obj: Arc<DynamicObject>, ctx: Arc<ControlPlaneReconciler>) -> Result<Outcome> {
    let parent_kind = ControlPlaneReconciler::parent_kind();
    let key = ObjectKey::from_object(&parent_kind, &obj)
        .ok_or_else(|| StewardError::Invalid("control plane without name or namespace".to_string()))?;
    let controlplane: OpenStackControlPlane = to_typed(&obj)?;
    let uid = controlplane
        .uid()
        .ok_or_else(|| StewardError::Invalid(format!("{} has no uid", key)))?;

    debug!("Reconciling control plane {}", controlplane.identity());
    controlplane.spec.validate()?;

    let mut reports = Vec::with_capacity(CHILD_ORDER.len());
    for child in CHILD_ORDER {
        let child_key = ObjectKey::new(child.kind(), &key.namespace, child.fixed_name());

        let ready = match resolve(&controlplane.spec, child) {
            DesiredChild::Present { spec, .. } => {
                let spec = spec.to_value()?;
                let converged = ctx
                    .converger
                    .create_or_patch(&child_key, |desired| {
                        desired.data["spec"] = spec.clone();
                        set_controller_reference(desired, &controlplane)
                    })
                    .await?;
                if converged.changed() {
                    info!("{} {:?}", child_key, converged.operation);
                }
                Some(child_ready(child, &converged.object)?)
            }
            DesiredChild::Absent { .. } => {
                if ctx.converger.ensure_absent(&child_key, &uid).await? {
                    info!("Removed disabled {}", child_key);
                }
                None
            }
        };
        reports.push(ChildReport { child, ready });
    }

    let all_ready = reports.iter().all(|r| r.ready != Some(false));
    let generation = controlplane.metadata.generation;
    ctx.converger
        .patch_status(&key, |status| write_status(status, &reports, generation))
        .await?;

    if all_ready {
        debug!("Control plane {} is ready", controlplane.identity());
        Ok(Outcome::Converged)
    } else {
        debug!("Waiting for children of {}", controlplane.identity());
        Ok(Outcome::RequeueAfter(Duration::from_secs(NOT_READY_REQUEUE_SECS)))
    }
}

pub fn error_policy(
    _obj: Arc<DynamicObject>,
    error: &StewardError,
    _ctx: Arc<ControlPlaneReconciler>,
) -> Outcome {
    warn!("Reconciliation error: {}", error);
    default_error_policy(error)
}

fn child_ready(child: ChildKind, obj: &DynamicObject) -> Result<bool> {
    Ok(match child {
        ChildKind::MariaDb => to_typed::<MariaDB>(obj)?.is_ready(),
        ChildKind::KeystoneApi => to_typed::<KeystoneAPI>(obj)?.is_ready(),
    })
}

fn condition_type(child: ChildKind) -> &'static str {
    match child {
        ChildKind::MariaDb => MARIADB_READY,
        ChildKind::KeystoneApi => KEYSTONE_READY,
    }
}

fn write_status(status: &mut Value, reports: &[ChildReport], generation: Option<i64>) -> Result<()> {
    let mut waiting = Vec::new();
    for report in reports {
        let kind = report.child.kind().kind;
        match report.ready {
            Some(true) => write_condition(
                status,
                Condition::new(
                    condition_type(report.child),
                    true,
                    REASON_CHILD_READY,
                    format!("{} is ready", kind),
                ),
            )?,
            Some(false) => {
                write_condition(
                    status,
                    Condition::new(
                        condition_type(report.child),
                        false,
                        REASON_CHILD_NOT_READY,
                        format!("{} is not ready yet", kind),
                    ),
                )?;
                waiting.push(kind);
            }
            None => drop_condition(status, condition_type(report.child))?,
        }
    }

    let ready = if waiting.is_empty() {
        Condition::new(READY, true, REASON_CONVERGED, "All services are ready")
    } else {
        Condition::new(
            READY,
            false,
            REASON_WAITING,
            format!("Waiting for {}", waiting.join(", ")),
        )
    };
    write_condition(status, ready)?;

    if let Some(generation) = generation {
        status["observedGeneration"] = Value::from(generation);
    }
    Ok(())
}

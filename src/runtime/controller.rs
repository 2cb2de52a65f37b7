// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcile loop: watches feed a work queue drained by a fixed worker pool.
//!
//! Triggering is level based. A reconciliation always re-reads the parent and
//! recomputes everything, so dropped or reordered events only cost latency
//! until the next event or resync.

use crate::config::Config;
use crate::constants::conditions::{READY, REASON_FAILED};
use crate::engine::converge::Converger;
use crate::engine::ownership::owner_key;
use crate::engine::status::write_condition;
use crate::error::{ErrorClass, Result, StewardError};
use crate::runtime::queue::WorkQueue;
use crate::store::{ChangeType, Kind, ObjectKey, Store, WatchEvent};
use crate::types::condition::Condition;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use kube::api::DynamicObject;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// What to do with a parent after one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing left to do until the next trigger
    Converged,
    /// Check again later, e.g. while children are still starting
    RequeueAfter(Duration),
    /// Retry soon, with per-parent exponential backoff
    RequeueImmediately,
    /// Recorded in the parent status; only a new trigger retries
    Fatal(String),
}

/// Map a reconcile error to an outcome by its class
pub fn default_error_policy(error: &StewardError) -> Outcome {
    match error.class() {
        ErrorClass::NotFound => Outcome::Converged,
        ErrorClass::Conflict | ErrorClass::Transient => Outcome::RequeueImmediately,
        ErrorClass::Invalid | ErrorClass::Fatal => Outcome::Fatal(error.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub workers: usize,
    pub resync_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub shutdown_grace: Duration,
    pub max_conflict_retries: u32,
    /// Ignore parents outside this namespace
    pub namespace: Option<String>,
}

impl From<&Config> for ControllerConfig {
    fn from(config: &Config) -> Self {
        ControllerConfig {
            workers: config.workers,
            resync_interval: config.resync_interval,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            shutdown_grace: config.shutdown_grace,
            max_conflict_retries: config.max_conflict_retries,
            namespace: config.watch_namespace.clone(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig::from(&Config::default())
    }
}

type ReconcileFn = Arc<dyn Fn(Arc<DynamicObject>) -> BoxFuture<'static, Result<Outcome>> + Send + Sync>;
type ErrorPolicyFn = Arc<dyn Fn(Arc<DynamicObject>, &StewardError) -> Outcome + Send + Sync>;

pub struct Controller {
    store: Arc<dyn Store>,
    parent_kind: Kind,
    owned: Vec<Kind>,
    config: ControllerConfig,
    queue: Arc<WorkQueue<ObjectKey>>,
}

impl Controller {
    pub fn new(store: Arc<dyn Store>, parent_kind: Kind, config: ControllerConfig) -> Self {
        let queue = WorkQueue::new(config.backoff_base, config.backoff_max);
        Self {
            store,
            parent_kind,
            owned: Vec::new(),
            config,
            queue,
        }
    }

    /// Also trigger the controlling parent when objects of `kind` change
    pub fn owns(mut self, kind: Kind) -> Self {
        self.owned.push(kind);
        self
    }

    /// The queue, for triggering reconciliations from outside
    pub fn queue(&self) -> Arc<WorkQueue<ObjectKey>> {
        self.queue.clone()
    }

    /// Run until `shutdown` resolves.
    ///
    /// `reconcile` is called with the freshly read parent. Errors it returns
    /// are turned into an [`Outcome`] by `error_policy`.
    pub async fn run<Ctx, ReconcileFut>(
        self,
        reconcile: impl Fn(Arc<DynamicObject>, Arc<Ctx>) -> ReconcileFut + Send + Sync + 'static,
        error_policy: impl Fn(Arc<DynamicObject>, &StewardError, Arc<Ctx>) -> Outcome + Send + Sync + 'static,
        ctx: Arc<Ctx>,
        shutdown: impl Future<Output = ()> + Send,
    ) -> anyhow::Result<()>
    where
        Ctx: Send + Sync + 'static,
        ReconcileFut: Future<Output = Result<Outcome>> + Send + 'static,
    {
        let reconcile: ReconcileFn = {
            let ctx = ctx.clone();
            Arc::new(move |obj: Arc<DynamicObject>| reconcile(obj, ctx.clone()).boxed())
        };
        let error_policy: ErrorPolicyFn =
            Arc::new(move |obj: Arc<DynamicObject>, err: &StewardError| error_policy(obj, err, ctx.clone()));

        let Controller {
            store,
            parent_kind,
            owned,
            config,
            queue,
        } = self;

        // Subscribe before the initial list so nothing falls in between
        let mut background = JoinSet::new();
        background.spawn(route_parent_events(
            store.watch(&parent_kind),
            config.namespace.clone(),
            queue.clone(),
        ));
        for kind in owned {
            info!("Watching owned {}", kind);
            background.spawn(route_owned_events(
                store.watch(&kind),
                parent_kind.clone(),
                config.namespace.clone(),
                queue.clone(),
            ));
        }
        background.spawn(resync(
            store.clone(),
            parent_kind.clone(),
            config.namespace.clone(),
            config.resync_interval,
            queue.clone(),
        ));

        let worker = Worker {
            converger: Converger::new(store.clone(), config.max_conflict_retries),
            store,
            queue: queue.clone(),
            reconcile,
            error_policy,
        };
        let mut workers = JoinSet::new();
        for id in 0..config.workers.max(1) {
            workers.spawn(worker.clone().run(id));
        }

        info!(
            "Controller for {} started with {} workers",
            parent_kind, config.workers
        );

        shutdown.await;

        info!("Shutting down controller for {}", parent_kind);
        queue.shutdown().await;
        background.shutdown().await;

        let drained = tokio::time::timeout(config.shutdown_grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "Reconciliations still running after {:?}, aborting them",
                config.shutdown_grace
            );
            workers.shutdown().await;
        }

        info!("Controller for {} stopped", parent_kind);
        Ok(())
    }
}

#[derive(Clone)]
struct Worker {
    store: Arc<dyn Store>,
    converger: Converger,
    queue: Arc<WorkQueue<ObjectKey>>,
    reconcile: ReconcileFn,
    error_policy: ErrorPolicyFn,
}

impl Worker {
    async fn run(self, id: usize) {
        debug!(worker = id, "Worker started");
        while let Some(key) = self.queue.get().await {
            self.process(&key).await;
            self.queue.done(&key).await;
        }
        debug!(worker = id, "Worker stopped");
    }

    #[instrument(skip(self, key), fields(object = %key))]
    async fn process(&self, key: &ObjectKey) {
        let parent = match self.store.get(key).await {
            Ok(Some(obj)) => Arc::new(obj),
            Ok(None) => {
                // Deleted; the store already reclaimed its children
                debug!("Object is gone, nothing to reconcile");
                self.queue.forget(key).await;
                return;
            }
            Err(e) => {
                let delay = self.queue.add_rate_limited(key.clone()).await;
                warn!("Failed to read object, retrying in {:?}: {}", delay, e);
                return;
            }
        };

        let attempt = AssertUnwindSafe((self.reconcile)(parent.clone()))
            .catch_unwind()
            .await;
        let outcome = match attempt {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!("Reconciliation error: {}", e);
                (self.error_policy)(parent, &e)
            }
            Err(_) => {
                let e = StewardError::Fatal("reconciler panicked".to_string());
                error!("{}", e);
                (self.error_policy)(parent, &e)
            }
        };

        self.apply(key, outcome).await;
    }

    async fn apply(&self, key: &ObjectKey, outcome: Outcome) {
        match outcome {
            Outcome::Converged => {
                debug!("Converged");
                self.queue.forget(key).await;
            }
            Outcome::RequeueAfter(delay) => {
                debug!("Requeue in {:?}", delay);
                self.queue.forget(key).await;
                self.queue.add_after(key.clone(), delay);
            }
            Outcome::RequeueImmediately => {
                let delay = self.queue.add_rate_limited(key.clone()).await;
                debug!("Requeue with backoff {:?}", delay);
            }
            Outcome::Fatal(message) => {
                error!("Reconciliation failed permanently: {}", message);
                self.queue.forget(key).await;
                self.record_failure(key, &message).await;
            }
        }
    }

    async fn record_failure(&self, key: &ObjectKey, message: &str) {
        let condition = Condition::new(READY, false, REASON_FAILED, message);
        let written = self
            .converger
            .patch_status(key, |status| write_condition(status, condition.clone()))
            .await;
        if let Err(e) = written {
            warn!("Failed to record failure in status: {}", e);
        }
    }
}

fn in_scope(namespace: &Option<String>, key: &ObjectKey) -> bool {
    namespace.as_deref().map_or(true, |ns| ns == key.namespace)
}

/// Decides which parent events trigger a reconciliation.
///
/// Status-only writes keep the generation; they are skipped so our own status
/// updates do not retrigger the parent. A recreated object has a new uid and
/// always passes.
#[derive(Default)]
struct ParentFilter {
    seen: HashMap<ObjectKey, (Option<String>, Option<i64>)>,
}

impl ParentFilter {
    fn admit(&mut self, event: &WatchEvent) -> bool {
        match event.change {
            ChangeType::Deleted => {
                self.seen.remove(&event.key);
                true
            }
            ChangeType::Applied => {
                let current = (event.uid.clone(), event.generation);
                let previous = self.seen.insert(event.key.clone(), current.clone());
                event.generation.is_none() || previous != Some(current)
            }
        }
    }
}

async fn route_parent_events(
    mut events: BoxStream<'static, Result<WatchEvent>>,
    namespace: Option<String>,
    queue: Arc<WorkQueue<ObjectKey>>,
) {
    let mut filter = ParentFilter::default();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!("Parent watch error: {}", e);
                continue;
            }
        };
        if !in_scope(&namespace, &event.key) || !filter.admit(&event) {
            continue;
        }
        debug!("Parent {} changed", event.key);
        queue.add(event.key).await;
    }
    debug!("Parent watch ended");
}

async fn route_owned_events(
    mut events: BoxStream<'static, Result<WatchEvent>>,
    parent_kind: Kind,
    namespace: Option<String>,
    queue: Arc<WorkQueue<ObjectKey>>,
) {
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!("Owned object watch error: {}", e);
                continue;
            }
        };
        if let Some(parent) = owner_key(&event, &parent_kind) {
            if in_scope(&namespace, &parent) {
                debug!("{} changed, triggering {}", event.key, parent);
                queue.add(parent).await;
            }
        }
    }
    debug!("Owned object watch ended");
}

async fn resync(
    store: Arc<dyn Store>,
    kind: Kind,
    namespace: Option<String>,
    interval: Duration,
    queue: Arc<WorkQueue<ObjectKey>>,
) {
    // The first tick fires right away and doubles as the initial sync
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match store.list(&kind, namespace.as_deref()).await {
            Ok(items) => {
                debug!("Resync of {}: {} objects", kind, items.len());
                for obj in &items {
                    if let Some(key) = ObjectKey::from_object(&kind, obj) {
                        queue.add(key).await;
                    }
                }
            }
            Err(e) => warn!("Resync of {} failed: {}", kind, e),
        }
    }
}
